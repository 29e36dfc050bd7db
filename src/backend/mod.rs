//! Backend selection
//!
//! Picks exactly one way to run the generation model from the configured
//! preference and the probed [`Capabilities`]. Priority order:
//!
//! 1. explicit compiler-optimized request: use it, or CPU with a warning
//! 2. `auto` with the compiler-optimized runtime present: use it
//! 3. quantized runtime + accelerator: 4-bit weight-only on the device
//! 4. accelerator alone: device-mapped at reduced precision
//! 5. CPU at full precision
//!
//! Selection is a pure function of its inputs; it never fails and never
//! caches. Degraded paths are logged and recorded in the decision's trail.

pub mod device;
pub mod probe;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub use device::{open_device, Accelerator, DeviceTarget, Precision};
pub use probe::{Capabilities, CapabilityProbe, SystemProbe};

/// User-facing backend preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendPreference {
    Auto,
    CompilerOptimized,
    QuantizedDevice,
    Cpu,
}

impl std::str::FromStr for BackendPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "compiled" | "compiler-optimized" | "onnx" | "openvino" | "ov" => {
                Ok(Self::CompilerOptimized)
            }
            "quantized" | "quantized-device" | "xpu" => Ok(Self::QuantizedDevice),
            "cpu" => Ok(Self::Cpu),
            other => Err(Error::config(
                "INFERENCE_BACKEND",
                format!(
                    "unknown backend '{}'. Valid options: auto, compiled, quantized, cpu",
                    other
                ),
            )),
        }
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::CompilerOptimized => write!(f, "compiled"),
            Self::QuantizedDevice => write!(f, "quantized"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Weight quantization scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantScheme {
    Symmetric,
}

/// Fixed weight-only quantization profile of the quantized-device path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationProfile {
    pub bits: u8,
    pub group_size: usize,
    pub scheme: QuantScheme,
}

impl QuantizationProfile {
    /// 4-bit, symmetric, 32-weight groups (GGUF Q4_0)
    pub const Q4_0: Self = Self {
        bits: 4,
        group_size: 32,
        scheme: QuantScheme::Symmetric,
    };

    /// Suffix identifying artifacts quantized with this profile
    pub fn artifact_suffix(&self) -> &'static str {
        "q4_0.gguf"
    }
}

impl std::fmt::Display for QuantizationProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "int{} weight-only, {:?}, group size {}",
            self.bits, self.scheme, self.group_size
        )
    }
}

/// One way of running the generation model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendStrategy {
    /// Exported graph executed by the compiler-optimized runtime
    CompilerOptimized,
    /// Quantized weights on an accelerator
    QuantizedDevice(QuantizationProfile),
    /// Full weights mapped onto an accelerator at reduced precision
    DeviceMapped(Precision),
    /// Full weights on CPU at full precision
    Cpu,
}

impl std::fmt::Display for BackendStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CompilerOptimized => write!(f, "compiler-optimized"),
            Self::QuantizedDevice(profile) => write!(f, "quantized-device ({})", profile),
            Self::DeviceMapped(precision) => write!(f, "device-mapped ({})", precision),
            Self::Cpu => write!(f, "cpu (f32)"),
        }
    }
}

/// Outcome of backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDecision {
    pub strategy: BackendStrategy,
    pub device: DeviceTarget,
    /// Why this strategy won, including every fallback taken
    pub trail: Vec<String>,
}

impl BackendDecision {
    fn new(strategy: BackendStrategy, device: DeviceTarget, trail: Vec<String>) -> Self {
        Self {
            strategy,
            device,
            trail,
        }
    }

    /// Whether selection had to fall back from what was asked for
    pub fn is_degraded(&self) -> bool {
        self.trail.iter().any(|step| step.starts_with("fallback:"))
    }
}

impl std::fmt::Display for BackendDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.strategy, self.device)?;
        for step in &self.trail {
            write!(f, "\n  - {}", step)?;
        }
        Ok(())
    }
}

/// Select a backend for a raw preference string
///
/// An unrecognized preference is logged and treated as "no preference":
/// the compiler-optimized runtime is then only chosen for `auto`, so the
/// device and CPU steps decide.
pub fn select_backend(preference: &str, caps: &Capabilities, device_hint: &str) -> BackendDecision {
    let mut trail = Vec::new();
    let parsed = match preference.parse::<BackendPreference>() {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!("{}; choosing among device and CPU paths", e);
            trail.push(format!("ignored: {}", e));
            None
        }
    };

    match parsed {
        Some(BackendPreference::CompilerOptimized) => {
            if caps.compiler_optimized {
                trail.push("compiler-optimized runtime requested and available".to_string());
                return compiled(device_hint, trail);
            }
            // Never upgraded to device acceleration behind the caller's back
            let err = Error::BackendUnavailable {
                requested: BackendPreference::CompilerOptimized.to_string(),
                reason: "runtime not available in this process".to_string(),
            };
            tracing::warn!("{}. Falling back to CPU", err);
            trail.push(format!("fallback: {}; using CPU", err));
            return cpu(trail);
        }
        Some(BackendPreference::Cpu) => {
            trail.push("cpu requested".to_string());
            return cpu(trail);
        }
        Some(BackendPreference::Auto) if caps.compiler_optimized => {
            trail.push("auto: compiler-optimized runtime available".to_string());
            return compiled(device_hint, trail);
        }
        Some(BackendPreference::Auto) => {
            trail.push("auto: compiler-optimized runtime unavailable".to_string());
        }
        Some(BackendPreference::QuantizedDevice) | None => {}
    }

    let quantized_requested = parsed == Some(BackendPreference::QuantizedDevice);

    match caps.accelerator {
        Some(kind) if caps.quantized_runtime => {
            let profile = QuantizationProfile::Q4_0;
            trail.push(format!("{} available with quantized runtime; {}", kind, profile));
            BackendDecision::new(
                BackendStrategy::QuantizedDevice(profile),
                DeviceTarget::Accelerator { kind, ordinal: 0 },
                trail,
            )
        }
        Some(kind) => {
            let precision = kind.reduced_precision();
            if quantized_requested {
                degrade(&mut trail, "quantized runtime not built", &format!("{} at {}", kind, precision));
            } else {
                trail.push(format!("{} available without quantized runtime", kind));
            }
            BackendDecision::new(
                BackendStrategy::DeviceMapped(precision),
                DeviceTarget::Accelerator { kind, ordinal: 0 },
                trail,
            )
        }
        None => {
            if quantized_requested {
                degrade(&mut trail, "no accelerator device available", "CPU");
            } else {
                trail.push("no accelerator device available".to_string());
            }
            cpu(trail)
        }
    }
}

fn degrade(trail: &mut Vec<String>, reason: &str, target: &str) {
    let err = Error::BackendUnavailable {
        requested: BackendPreference::QuantizedDevice.to_string(),
        reason: reason.to_string(),
    };
    tracing::warn!("{}. Falling back to {}", err, target);
    trail.push(format!("fallback: {}; using {}", err, target));
}

fn compiled(device_hint: &str, trail: Vec<String>) -> BackendDecision {
    BackendDecision::new(
        BackendStrategy::CompilerOptimized,
        DeviceTarget::Runtime(device_hint.to_string()),
        trail,
    )
}

fn cpu(trail: Vec<String>) -> BackendDecision {
    BackendDecision::new(BackendStrategy::Cpu, DeviceTarget::Cpu, trail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_caps() -> Vec<Capabilities> {
        let mut out = Vec::new();
        for compiled in [false, true] {
            for quantized in [false, true] {
                for acc in [None, Some(Accelerator::Cuda), Some(Accelerator::Metal)] {
                    out.push(
                        Capabilities::cpu_only()
                            .with_compiler_optimized(compiled)
                            .with_quantized_runtime(quantized)
                            .with_accelerator(acc),
                    );
                }
            }
        }
        out
    }

    #[test]
    fn test_preference_from_str() {
        assert_eq!("auto".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!(
            "OpenVINO".parse::<BackendPreference>().unwrap(),
            BackendPreference::CompilerOptimized
        );
        assert_eq!(
            "xpu".parse::<BackendPreference>().unwrap(),
            BackendPreference::QuantizedDevice
        );
        assert_eq!(" CPU ".parse::<BackendPreference>().unwrap(), BackendPreference::Cpu);
        assert!("tpu".parse::<BackendPreference>().is_err());
    }

    #[test]
    fn test_auto_prefers_compiled_whenever_available() {
        for caps in all_caps().into_iter().filter(|c| c.compiler_optimized) {
            let decision = select_backend("auto", &caps, "CPU");
            assert_eq!(decision.strategy, BackendStrategy::CompilerOptimized);
            assert_eq!(decision.device, DeviceTarget::Runtime("CPU".to_string()));
        }
    }

    #[test]
    fn test_compiled_never_selected_when_unavailable() {
        for caps in all_caps().into_iter().filter(|c| !c.compiler_optimized) {
            for pref in ["auto", "compiled", "quantized", "cpu", "bogus"] {
                let decision = select_backend(pref, &caps, "CPU");
                assert_ne!(decision.strategy, BackendStrategy::CompilerOptimized);
            }
        }
    }

    #[test]
    fn test_explicit_compiled_unavailable_falls_back_to_cpu() {
        // Even with a fully capable accelerator present
        let caps = Capabilities::cpu_only()
            .with_quantized_runtime(true)
            .with_accelerator(Some(Accelerator::Cuda));
        let decision = select_backend("openvino", &caps, "GPU");

        assert_eq!(decision.strategy, BackendStrategy::Cpu);
        assert_eq!(decision.device, DeviceTarget::Cpu);
        assert!(decision.is_degraded());
    }

    #[test]
    fn test_explicit_compiled_available_uses_hint() {
        let caps = Capabilities::cpu_only().with_compiler_optimized(true);
        let decision = select_backend("compiled", &caps, "GPU");
        assert_eq!(decision.strategy, BackendStrategy::CompilerOptimized);
        assert_eq!(decision.device, DeviceTarget::Runtime("GPU".to_string()));
        assert!(!decision.is_degraded());
    }

    #[test]
    fn test_quantized_device_path() {
        let caps = Capabilities::cpu_only()
            .with_quantized_runtime(true)
            .with_accelerator(Some(Accelerator::Cuda));
        let decision = select_backend("auto", &caps, "CPU");

        match decision.strategy {
            BackendStrategy::QuantizedDevice(profile) => {
                assert_eq!(profile.bits, 4);
                assert_eq!(profile.scheme, QuantScheme::Symmetric);
                assert_eq!(profile.group_size, 32);
            }
            other => panic!("unexpected strategy: {:?}", other),
        }
        assert_eq!(
            decision.device,
            DeviceTarget::Accelerator {
                kind: Accelerator::Cuda,
                ordinal: 0
            }
        );
    }

    #[test]
    fn test_device_mapped_without_quantization() {
        let caps = Capabilities::cpu_only().with_accelerator(Some(Accelerator::Cuda));
        let decision = select_backend("auto", &caps, "CPU");
        assert_eq!(decision.strategy, BackendStrategy::DeviceMapped(Precision::Bf16));
        assert!(!decision.is_degraded());

        let metal = Capabilities::cpu_only().with_accelerator(Some(Accelerator::Metal));
        let decision = select_backend("auto", &metal, "CPU");
        assert_eq!(decision.strategy, BackendStrategy::DeviceMapped(Precision::F16));
    }

    #[test]
    fn test_quantized_runtime_without_device_is_cpu() {
        let caps = Capabilities::cpu_only().with_quantized_runtime(true);
        let decision = select_backend("auto", &caps, "CPU");
        assert_eq!(decision.strategy, BackendStrategy::Cpu);
    }

    #[test]
    fn test_requested_quantized_degrades_with_trail() {
        let caps = Capabilities::cpu_only().with_accelerator(Some(Accelerator::Cuda));
        let decision = select_backend("quantized", &caps, "CPU");
        assert_eq!(decision.strategy, BackendStrategy::DeviceMapped(Precision::Bf16));
        assert!(decision.is_degraded());

        let decision = select_backend("quantized", &Capabilities::cpu_only(), "CPU");
        assert_eq!(decision.strategy, BackendStrategy::Cpu);
        assert!(decision.is_degraded());
    }

    #[test]
    fn test_explicit_cpu_is_honored() {
        for caps in all_caps() {
            let decision = select_backend("cpu", &caps, "CPU");
            assert_eq!(decision.strategy, BackendStrategy::Cpu);
            assert!(!decision.is_degraded());
        }
    }

    #[test]
    fn test_unknown_preference_skips_compiled() {
        let caps = Capabilities::cpu_only()
            .with_compiler_optimized(true)
            .with_accelerator(Some(Accelerator::Metal));
        let decision = select_backend("tpu", &caps, "CPU");
        assert_eq!(decision.strategy, BackendStrategy::DeviceMapped(Precision::F16));
        assert!(decision.trail[0].starts_with("ignored:"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        for caps in all_caps() {
            for pref in ["auto", "compiled", "quantized", "cpu"] {
                assert_eq!(
                    select_backend(pref, &caps, "CPU"),
                    select_backend(pref, &caps, "CPU")
                );
            }
        }
    }
}
