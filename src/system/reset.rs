// Station MAC lookup and the post-update restart

use anyhow::Result;
use log::info;

/// Delay between committing an image and restarting, lets the log drain
pub const RESTART_SETTLE_MS: u32 = 1000;

/// Read the Wi-Fi station MAC, the default device id
#[cfg(target_os = "espidf")]
pub fn station_mac() -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    esp_idf_sys::esp!(unsafe {
        esp_idf_sys::esp_read_mac(mac.as_mut_ptr(), esp_idf_sys::esp_mac_type_t_ESP_MAC_WIFI_STA)
    })?;
    Ok(mac)
}

#[cfg(not(target_os = "espidf"))]
pub fn station_mac() -> Result<[u8; 6]> {
    anyhow::bail!("no hardware identifier on this target, set a device id explicitly")
}

/// Restart into the freshly committed image. Never returns.
#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    info!("Restarting into new firmware in {} ms", RESTART_SETTLE_MS);
    log::logger().flush();
    esp_idf_hal::delay::FreeRtos::delay_ms(RESTART_SETTLE_MS);
    esp_idf_hal::reset::restart()
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    // Host builds: ending the process is the closest thing to a reboot
    info!("Restart requested, exiting");
    log::logger().flush();
    std::process::exit(0)
}
