use anyhow::Result;
use candle_core::Device;
use tracing::{info, warn};

use localqa_core::config::DeviceKind;

pub fn select_device(kind: DeviceKind) -> Result<Device> {
    match kind {
        DeviceKind::Metal => {
            #[cfg(feature = "metal")]
            {
                match Device::new_metal(0) {
                    Ok(dev) => { info!("Device: Metal (MPS)"); return Ok(dev); }
                    Err(e) => warn!("Metal device unavailable ({e}), falling back to CPU"),
                }
            }
            #[cfg(not(feature = "metal"))]
            warn!("Metal requested but this build has no `metal` feature, falling back to CPU");
        }
        DeviceKind::Cpu => {}
    }
    info!("Device: CPU");
    Ok(Device::Cpu)
}
