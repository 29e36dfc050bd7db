//! Runtime capability probing
//!
//! Probes run once at startup and their answers are handed to the selector as
//! plain data. A probe that fails counts as "unavailable"; it never aborts.

use serde::{Deserialize, Serialize};

use super::device::{detect_accelerator, Accelerator};

/// Which optional runtimes this process can use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Compiler-optimized runtime is linked and its environment initializes
    pub compiler_optimized: bool,

    /// Quantized-weight device path is built in
    pub quantized_runtime: bool,

    /// Accelerated tensor backend reporting an available device
    pub accelerator: Option<Accelerator>,
}

impl Capabilities {
    /// Nothing but the CPU path
    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn with_compiler_optimized(mut self, available: bool) -> Self {
        self.compiler_optimized = available;
        self
    }

    pub fn with_quantized_runtime(mut self, available: bool) -> Self {
        self.quantized_runtime = available;
        self
    }

    pub fn with_accelerator(mut self, accelerator: Option<Accelerator>) -> Self {
        self.accelerator = accelerator;
        self
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |b: bool| if b { "✓" } else { "✗" };
        writeln!(f, "  CPU: ✓ Always available")?;
        writeln!(f, "  Compiler-optimized runtime: {}", mark(self.compiler_optimized))?;
        writeln!(f, "  Quantized device runtime: {}", mark(self.quantized_runtime))?;
        match self.accelerator {
            Some(acc) => write!(f, "  Accelerator: ✓ {}", acc),
            None => write!(f, "  Accelerator: ✗ none"),
        }
    }
}

/// Source of capability answers
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> Capabilities;
}

/// Fixed answers, for tests and for forcing a configuration
impl CapabilityProbe for Capabilities {
    fn probe(&self) -> Capabilities {
        *self
    }
}

/// Probes the real process: cargo features plus device/runtime initialization
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl CapabilityProbe for SystemProbe {
    fn probe(&self) -> Capabilities {
        let caps = Capabilities {
            compiler_optimized: compiler_optimized_available(),
            quantized_runtime: cfg!(feature = "quantized"),
            accelerator: detect_accelerator(),
        };
        tracing::debug!("Probed capabilities: {:?}", caps);
        caps
    }
}

fn compiler_optimized_available() -> bool {
    #[cfg(feature = "onnx")]
    {
        crate::generator::onnx::runtime_available()
    }
    #[cfg(not(feature = "onnx"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_probe_returns_itself() {
        let caps = Capabilities::cpu_only()
            .with_quantized_runtime(true)
            .with_accelerator(Some(Accelerator::Cuda));
        assert_eq!(caps.probe(), caps);
    }

    #[test]
    fn test_system_probe_matches_build() {
        let caps = SystemProbe.probe();
        assert_eq!(caps.quantized_runtime, cfg!(feature = "quantized"));
        if !cfg!(feature = "onnx") {
            assert!(!caps.compiler_optimized);
        }
        if !cfg!(any(feature = "cuda", feature = "metal")) {
            assert!(caps.accelerator.is_none());
        }
    }

    #[test]
    fn test_display_lists_every_runtime() {
        let text = Capabilities::cpu_only().to_string();
        assert!(text.contains("CPU"));
        assert!(text.contains("Compiler-optimized"));
        assert!(text.contains("Accelerator: ✗"));
    }
}
