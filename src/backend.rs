//! Backend selection
//!
//! The tensor backend is picked at build time: CUDA when the `cuda` feature is
//! enabled, otherwise the NdArray CPU backend. The device is fixed for the
//! lifetime of the process.

use burn::backend::Autodiff;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("Enable a backend feature: `ndarray` (CPU) or `cuda` (GPU).");

/// Autodiff backend used by the training loop
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device handle for the default backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Human-readable name of the compiled-in backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
