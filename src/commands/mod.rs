//! CLI command implementations
//!
//! Every command except `probe` and `backends` works on an open
//! [`DeviceHandle`](bladectl_device::DeviceHandle) and never needs to know
//! which backend produced it.

pub mod device;
mod list;
pub mod progress;
pub mod samples;

pub use list::{list_backends, list_devices};

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    log::info!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}
