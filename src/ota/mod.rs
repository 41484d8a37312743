// OTA (Over-The-Air) update module

pub mod writer;

#[cfg(target_os = "espidf")]
pub mod manager;

pub use writer::{
    stream, FlashUpdate, FlashUpdateSink, TransferOutcome, TransferReport, WriteFailure, CHUNK_SIZE,
};

#[cfg(target_os = "espidf")]
pub use manager::OtaManager;

// OTA update flow:
// 1. Fetch the manifest and pick a profile
// 2. Stream the image into the next OTA partition
// 3. Validate and set it as the boot partition
// 4. Restart (or leave that to the caller)
