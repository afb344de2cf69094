use crate::kind;
use log::info;
use nga::{Device, DeviceInfo, FaultKind, Vm};

/// Saves memory to a file
///
/// ```text
/// name --
/// ```
///
/// Writes cells from 0 up to and including the heap pointer.
pub struct ImageSaver;

impl Device for ImageSaver {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::IMAGE,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let addr = vm.pop()?;
        let name = vm.extract_string(addr);
        let bytes = vm.save_image()?;
        std::fs::write(&name, &bytes).map_err(|e| {
            FaultKind::Device(format!("unable to save image {name:?}: {e}"))
        })?;
        info!("saved {} bytes to {name:?}", bytes.len());
        Ok(())
    }
}
