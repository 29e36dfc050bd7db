//! Device construction for the candle backends

use anyhow::Result;
use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};

/// Hardware accelerator family a tensor backend can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accelerator {
    Cuda,
    Metal,
}

impl Accelerator {
    /// Reduced precision used for device-mapped loading on this accelerator
    pub fn reduced_precision(&self) -> Precision {
        match self {
            Self::Cuda => Precision::Bf16,
            // bf16 matmul coverage on Metal is partial in candle
            Self::Metal => Precision::F16,
        }
    }
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
        }
    }
}

/// Where a backend runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTarget {
    Cpu,
    Accelerator { kind: Accelerator, ordinal: usize },
    /// Device name handed to the compiler-optimized runtime
    Runtime(String),
}

impl std::fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator { kind, ordinal } => write!(f, "{}:{}", kind, ordinal),
            Self::Runtime(name) => write!(f, "runtime:{}", name),
        }
    }
}

/// Weight precision for safetensors loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32 => DType::F32,
            Self::F16 => DType::F16,
            Self::Bf16 => DType::BF16,
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
            Self::Bf16 => write!(f, "bf16"),
        }
    }
}

/// Open the candle device for a target
///
/// Unlike probing, this fails loudly: by the time a device is opened the
/// backend has already been chosen.
pub fn open_device(target: &DeviceTarget) -> Result<Device> {
    match target {
        DeviceTarget::Cpu | DeviceTarget::Runtime(_) => Ok(Device::Cpu),
        DeviceTarget::Accelerator { kind, ordinal } => open_accelerator(*kind, *ordinal),
    }
}

fn open_accelerator(kind: Accelerator, ordinal: usize) -> Result<Device> {
    match kind {
        Accelerator::Cuda => {
            #[cfg(feature = "cuda")]
            {
                Ok(Device::new_cuda(ordinal)?)
            }
            #[cfg(not(feature = "cuda"))]
            {
                anyhow::bail!("cuda:{} requested but not compiled with 'cuda' feature", ordinal)
            }
        }
        Accelerator::Metal => {
            #[cfg(feature = "metal")]
            {
                Ok(Device::new_metal(ordinal)?)
            }
            #[cfg(not(feature = "metal"))]
            {
                anyhow::bail!("metal:{} requested but not compiled with 'metal' feature", ordinal)
            }
        }
    }
}

/// Check if CUDA is available
pub fn is_cuda_available() -> bool {
    #[cfg(feature = "cuda")]
    {
        Device::new_cuda(0).is_ok()
    }
    #[cfg(not(feature = "cuda"))]
    {
        false
    }
}

/// Check if Metal is available
pub fn is_metal_available() -> bool {
    #[cfg(feature = "metal")]
    {
        Device::new_metal(0).is_ok()
    }
    #[cfg(not(feature = "metal"))]
    {
        false
    }
}

/// First accelerator that opens, CUDA before Metal
pub fn detect_accelerator() -> Option<Accelerator> {
    if is_cuda_available() {
        tracing::debug!("CUDA device 0 opened");
        Some(Accelerator::Cuda)
    } else if is_metal_available() {
        tracing::debug!("Metal device 0 opened");
        Some(Accelerator::Metal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_opens() {
        assert!(open_device(&DeviceTarget::Cpu).is_ok());
        assert!(open_device(&DeviceTarget::Runtime("CPU".to_string()))
            .map(|d| d.is_cpu())
            .unwrap());
    }

    #[test]
    fn test_reduced_precision() {
        assert_eq!(Accelerator::Cuda.reduced_precision(), Precision::Bf16);
        assert_eq!(Accelerator::Metal.reduced_precision(), Precision::F16);
        assert_eq!(Precision::Bf16.dtype(), DType::BF16);
    }

    #[test]
    fn test_device_target_display() {
        let target = DeviceTarget::Accelerator {
            kind: Accelerator::Cuda,
            ordinal: 0,
        };
        assert_eq!(target.to_string(), "cuda:0");
        assert_eq!(DeviceTarget::Runtime("GPU".into()).to_string(), "runtime:GPU");
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn test_no_accelerator_without_features() {
        assert!(detect_accelerator().is_none());
        let target = DeviceTarget::Accelerator {
            kind: Accelerator::Cuda,
            ordinal: 0,
        };
        assert!(open_device(&target).is_err());
    }
}
