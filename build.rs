use std::env;
use std::fs;
use std::path::Path;

const DEFAULT_BOARD: &str = "ESP32S3_DEV";

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF, meaningless on the host
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    println!("cargo:rustc-check-cfg=cfg(esp_idf_esp_tls_skip_server_cert_verify)");
    println!("cargo:rerun-if-env-changed=OTA_PULL_BOARD");
    println!("cargo:rerun-if-changed=ota_config.h");

    // Board name: environment wins, then ota_config.h, then the default
    let board = match env::var("OTA_PULL_BOARD") {
        Ok(board) if !board.is_empty() => board,
        _ => board_from_header("ota_config.h")?.unwrap_or_else(|| DEFAULT_BOARD.to_string()),
    };
    println!("cargo:rustc-env=OTA_PULL_BOARD={}", board);

    Ok(())
}

fn board_from_header(path: &str) -> anyhow::Result<Option<String>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let board = contents
        .lines()
        .find(|l| l.contains("#define OTA_BOARD"))
        .and_then(|line| line.split('"').nth(1))
        .map(str::to_string);

    if board.is_none() {
        println!("cargo:warning=ota_config.h has no OTA_BOARD define, using {}", DEFAULT_BOARD);
    }
    Ok(board)
}
