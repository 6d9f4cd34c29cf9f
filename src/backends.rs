//! Backend registration and opening
//!
//! A backend supplies the register window, select pins and DMA channels a
//! controller runs on. Backends are named with the same
//! `name:key=value,key=value` strings on every command.

use std::collections::HashMap;

use thiserror::Error;
use vtspi_controller::{ControllerError, Hardware, SpiController};
use vtspi_core::BoardConfig;

/// Information about a backend
pub struct BackendInfo {
    /// Name used for matching
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Errors opening a backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Unknown or disabled backend
    #[error("unknown backend '{0}' (try list-backends)")]
    Unknown(String),

    /// Malformed option string
    #[error("invalid backend parameter '{0}' (expected key=value)")]
    BadParameter(String),

    /// Required option missing
    #[error("backend '{backend}' needs the '{key}' parameter")]
    MissingParameter {
        backend: &'static str,
        key: &'static str,
    },

    /// Option present but unusable
    #[error("invalid value for '{key}': {value}")]
    BadValue { key: &'static str, value: String },

    /// Controller could not be brought up
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "sim")]
    backends.push(BackendInfo {
        name: "sim",
        description: "In-memory controller emulator (peripheral=loopback|invert|ones)",
    });

    #[cfg(feature = "mmio")]
    backends.push(BackendInfo {
        name: "mmio",
        description: "Memory-mapped controller through /dev/mem, FIFO only (addr=<phys>)",
    });

    backends
}

/// Comma separated backend names for help text
pub fn backend_names_short() -> String {
    available_backends()
        .iter()
        .map(|b| b.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parsed backend specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name
    pub name: String,
    /// Options
    pub params: HashMap<String, String>,
}

/// Parse "name" or "name:key=value,key=value"
pub fn parse_backend_params(s: &str) -> Result<BackendParams, BackendError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            let (key, value) = opt
                .split_once('=')
                .ok_or_else(|| BackendError::BadParameter(opt.to_string()))?;
            params.insert(key.to_string(), value.to_string());
        }
    }

    Ok(BackendParams {
        name: name.to_string(),
        params,
    })
}

/// Open `spec` and start a controller for `board` on it
pub fn open_controller(spec: &str, board: &BoardConfig) -> Result<SpiController, BackendError> {
    let params = parse_backend_params(spec)?;
    let hardware = match params.name.as_str() {
        #[cfg(feature = "sim")]
        "sim" => open_sim(&params)?,
        #[cfg(feature = "mmio")]
        "mmio" => open_mmio(&params)?,
        _ => return Err(BackendError::Unknown(params.name)),
    };
    log::debug!("Opened backend '{}'", params.name);
    Ok(SpiController::new(board.clone(), hardware)?)
}

#[cfg(feature = "sim")]
fn open_sim(params: &BackendParams) -> Result<Hardware, BackendError> {
    use vtspi_sim::SimController;

    let sim = match params.params.get("peripheral").map(String::as_str) {
        None | Some("loopback") => SimController::new(),
        Some("invert") => SimController::with_peripheral(|b| !b),
        Some("ones") => SimController::with_peripheral(|_| 0xff),
        Some(other) => {
            return Err(BackendError::BadValue {
                key: "peripheral",
                value: other.to_string(),
            })
        }
    };

    Ok(Hardware {
        registers: Box::new(sim.registers()),
        pins: Box::new(sim.pins()),
        dma: Some(Box::new(sim.dma())),
    })
}

#[cfg(feature = "mmio")]
fn open_mmio(params: &BackendParams) -> Result<Hardware, BackendError> {
    use vtspi_controller::MmioRegisters;
    use vtspi_core::hal::NoPins;

    let addr = params
        .params
        .get("addr")
        .ok_or(BackendError::MissingParameter {
            backend: "mmio",
            key: "addr",
        })?;
    let phys = parse_address(addr).ok_or_else(|| BackendError::BadValue {
        key: "addr",
        value: addr.clone(),
    })?;

    // User space has no access to the system DMA engine or the select GPIOs
    log::warn!("mmio backend: DMA and GPIO select lines unavailable");
    Ok(Hardware {
        registers: Box::new(MmioRegisters::map(phys)?),
        pins: Box::new(NoPins),
        dma: None,
    })
}

#[cfg_attr(not(feature = "mmio"), allow(dead_code))]
fn parse_address(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_params() {
        let p = parse_backend_params("mmio:addr=0xd8240000").unwrap();
        assert_eq!(p.name, "mmio");
        assert_eq!(p.params.get("addr").map(String::as_str), Some("0xd8240000"));

        let p = parse_backend_params("sim").unwrap();
        assert_eq!(p.name, "sim");
        assert!(p.params.is_empty());

        assert!(matches!(
            parse_backend_params("sim:peripheral"),
            Err(BackendError::BadParameter(_))
        ));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0xd8240000"), Some(0xd824_0000));
        assert_eq!(parse_address("4096"), Some(4096));
        assert_eq!(parse_address("0xzz"), None);
    }

    #[test]
    fn test_unknown_backend() {
        let err = open_controller("nope", &BoardConfig::default()).unwrap_err();
        assert!(matches!(err, BackendError::Unknown(name) if name == "nope"));
    }

    #[cfg(feature = "sim")]
    #[test]
    fn test_open_sim_rejects_bad_peripheral() {
        let err = open_controller("sim:peripheral=random", &BoardConfig::default()).unwrap_err();
        assert!(matches!(err, BackendError::BadValue { key: "peripheral", .. }));
    }
}
