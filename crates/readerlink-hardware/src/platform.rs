//! Runtime platform capability detection.

use std::path::Path;

const CPUINFO: &str = "/proc/cpuinfo";

/// Marker present in the `Hardware` line of Broadcom SoC boards.
const BROADCOM_MARKER: &str = ": BCM";

/// Whether this board exposes the GPIO header the session drives.
///
/// Detection is by CPU identification: Raspberry Pi class boards report a
/// Broadcom SoC in `/proc/cpuinfo`. Any read failure means "no GPIO".
pub fn gpio_supported() -> bool {
    gpio_supported_from(Path::new(CPUINFO))
}

pub(crate) fn gpio_supported_from(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(cpuinfo) => cpuinfo_has_gpio(&cpuinfo),
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "cpuinfo unavailable, assuming no GPIO");
            false
        }
    }
}

fn cpuinfo_has_gpio(cpuinfo: &str) -> bool {
    cpuinfo.contains(BROADCOM_MARKER)
}
