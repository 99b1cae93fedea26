use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

/// Check the requested backend against what this build was compiled with.
pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; the WGPU backend is used despite --backend nd-array");
        }
        _ => {}
    }
    Ok(())
}

/// Parse `WIDTHxHEIGHT` (e.g. `640x480`).
pub fn parse_dims(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let w: u32 = w
        .trim()
        .parse()
        .map_err(|e| format!("invalid width '{w}': {e}"))?;
    let h: u32 = h
        .trim()
        .parse()
        .map_err(|e| format!("invalid height '{h}': {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("dimensions must be non-zero, got {w}x{h}"));
    }
    Ok((w, h))
}

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
