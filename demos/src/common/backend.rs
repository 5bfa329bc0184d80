//! Backend selection for the demos.
//!
//! The backend is fixed at compile time by feature flag: `cuda` wins over `wgpu`,
//! and `ndarray` is the fallback.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Selected backend type
        pub type SelectedBackend = burn::backend::cuda::Cuda;
        /// Selected device type
        pub type SelectedDevice = burn::backend::cuda::CudaDevice;

        const NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        /// Selected backend type
        pub type SelectedBackend = burn::backend::wgpu::Wgpu;
        /// Selected device type
        pub type SelectedDevice = burn::backend::wgpu::WgpuDevice;

        const NAME: &str = "WGPU (GPU)";
    } else {
        /// Selected backend type
        pub type SelectedBackend = burn::backend::ndarray::NdArray;
        /// Selected device type
        pub type SelectedDevice = burn::backend::ndarray::NdArrayDevice;

        const NAME: &str = "NdArray (CPU)";
    }
}

/// Creates the default device of the selected backend
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Gets the backend name for logging and reports
pub const fn get_backend_name() -> &'static str {
    NAME
}
