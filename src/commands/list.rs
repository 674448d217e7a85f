//! List commands implementation

use bladectl_core::{BackendKind, DeviceIdentity};
use bladectl_device::{available_backends, BackendSelector};

/// List backends compiled into this build
pub fn list_backends() {
    println!("Available backends (in selection order):");
    println!();
    for backend in available_backends() {
        println!("  {:<8} - {}", backend.name, backend.description);
    }
}

/// List attached devices matching `specifier`
pub fn list_devices(specifier: &str) -> Result<(), Box<dyn std::error::Error>> {
    let wanted = DeviceIdentity::parse(specifier)?;
    let selector = BackendSelector::new();

    let devices: Vec<DeviceIdentity> = selector
        .probe(wanted.backend)
        .into_iter()
        .filter(|found| wanted.matches(found))
        .collect();

    if devices.is_empty() {
        println!("No devices found");
        if wanted.backend == BackendKind::Any {
            println!("(the simulated device is only listed with -d dummy)");
        }
        return Ok(());
    }

    println!("{:<10} {:<18} {:>5} {:>5} {:>9}", "Backend", "Serial", "Bus", "Addr", "Instance");
    println!("{}", "-".repeat(51));
    for device in &devices {
        println!(
            "{:<10} {:<18} {:>5} {:>5} {:>9}",
            device.backend,
            device
                .serial
                .map(|s| format!("{:016x}", s))
                .unwrap_or_else(|| "-".to_string()),
            format_field(device.usb_bus),
            format_field(device.usb_addr),
            format_field(device.instance),
        );
    }
    Ok(())
}

fn format_field<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
