// OTA Manager - flash sink backed by the ESP-IDF OTA partition API

use anyhow::{Context, Result};
use esp_idf_svc::ota::{EspOta, EspOtaUpdate, SlotState};
use log::info;

use super::writer::{FlashUpdate, FlashUpdateSink};

pub struct OtaManager {
    ota: EspOta,
}

impl OtaManager {
    pub fn new() -> Result<Self> {
        let ota = EspOta::new().context("failed to obtain OTA instance")?;
        Ok(Self { ota })
    }

    pub fn get_running_partition(&self) -> Result<String> {
        let slot = self.ota.get_running_slot()?;
        Ok(slot.label.to_string())
    }

    /// Confirm the running image so the bootloader stops considering a rollback
    pub fn mark_running_slot_valid(&mut self) -> Result<()> {
        if self.ota.get_running_slot()?.state != SlotState::Valid {
            self.ota.mark_running_slot_valid()?;
            info!("OTA: running slot marked valid");
        }
        Ok(())
    }
}

impl FlashUpdateSink for OtaManager {
    type Update<'a> = EspOtaUpdate<'a>;

    fn begin(&mut self) -> Result<EspOtaUpdate<'_>> {
        let update = self
            .ota
            .initiate_update()
            .context("no OTA partition available")?;
        info!("OTA: update partition opened");
        Ok(update)
    }
}

impl<'a> FlashUpdate for EspOtaUpdate<'a> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(EspOtaUpdate::write(self, data)?)
    }

    fn complete(self) -> Result<()> {
        // Validates the image and switches the boot partition
        EspOtaUpdate::complete(self).context("image validation failed")?;
        Ok(())
    }

    fn abort(self) -> Result<()> {
        Ok(EspOtaUpdate::abort(self)?)
    }
}
