//! CUDA driver API backend.
//!
//! Device contexts are cudarc [`CudaContext`]s, released when the last
//! reference is dropped. Compiled cubins are loaded with `cuModuleLoad`
//! and unloaded when the [`CudaModule`] guard is dropped, so a failure at
//! any point still releases both.

use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use cudarc::driver::sys as cuda_sys;
use cudarc::driver::CudaContext;

use occutune_core::device::{DeviceDescriptor, DevicePlatform, DeviceSession, LoadedModule};
use occutune_core::error::{Result, TuneError};
use occutune_core::kernel::ResourceSample;

/// Enumerates CUDA devices through the driver API.
#[derive(Debug, Default, Clone, Copy)]
pub struct CudaPlatform;

impl CudaPlatform {
    /// Creates the platform.
    pub fn new() -> Self {
        Self
    }
}

fn attribute(ctx: &CudaContext, attrib: cuda_sys::CUdevice_attribute, what: &str) -> Result<u32> {
    let value = ctx
        .attribute(attrib)
        .map_err(|e| TuneError::Driver(format!("Failed to get {}: {}", what, e)))?;
    Ok(value.max(0) as u32)
}

impl DevicePlatform for CudaPlatform {
    type Session = CudaSession;

    fn device_count(&self) -> Result<usize> {
        let count = CudaContext::device_count()
            .map_err(|e| TuneError::Driver(format!("Failed to count CUDA devices: {}", e)))?;
        Ok(count.max(0) as usize)
    }

    fn properties(&self, device_id: usize) -> Result<DeviceDescriptor> {
        use cuda_sys::CUdevice_attribute as Attr;

        let session = self.open(device_id)?;
        let ctx = &session.ctx;

        let name = ctx
            .name()
            .map_err(|e| TuneError::Driver(format!("Failed to get device name: {}", e)))?;
        let total_global_memory = unsafe { cudarc::driver::result::device::total_mem(ctx.cu_device()) }
            .map_err(|e| TuneError::Driver(format!("Failed to get total memory: {}", e)))?;

        Ok(DeviceDescriptor {
            device_id,
            name,
            compute_capability: (
                attribute(ctx, Attr::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR, "compute capability")?,
                attribute(ctx, Attr::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR, "compute capability")?,
            ),
            multiprocessor_count: attribute(
                ctx,
                Attr::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT,
                "SM count",
            )?,
            max_threads_per_block: attribute(
                ctx,
                Attr::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK,
                "max threads per block",
            )?,
            max_threads_per_multiprocessor: attribute(
                ctx,
                Attr::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_MULTIPROCESSOR,
                "max threads per SM",
            )?,
            registers_per_block: attribute(
                ctx,
                Attr::CU_DEVICE_ATTRIBUTE_MAX_REGISTERS_PER_BLOCK,
                "registers per block",
            )?,
            shared_mem_per_multiprocessor: u64::from(attribute(
                ctx,
                Attr::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_MULTIPROCESSOR,
                "shared memory per SM",
            )?),
            total_global_memory: total_global_memory as u64,
        })
    }

    fn open(&self, device_id: usize) -> Result<CudaSession> {
        let ctx = CudaContext::new(device_id).map_err(|e| {
            TuneError::Driver(format!(
                "Failed to create CUDA context on device {}: {}",
                device_id, e
            ))
        })?;
        Ok(CudaSession { ctx, device_id })
    }
}

/// A context on one CUDA device.
pub struct CudaSession {
    ctx: Arc<CudaContext>,
    device_id: usize,
}

impl DeviceSession for CudaSession {
    type Module = CudaModule;

    fn make_current(&self) -> Result<()> {
        self.ctx.bind_to_thread().map_err(|e| {
            TuneError::Driver(format!(
                "Failed to set context of device {} current: {}",
                self.device_id, e
            ))
        })
    }

    fn load(&self, binary: &Path) -> Result<CudaModule> {
        let path = CString::new(binary.to_string_lossy().as_bytes()).map_err(|e| {
            TuneError::LoadFailure(format!("Invalid binary path {}: {}", binary.display(), e))
        })?;

        let mut module: cuda_sys::CUmodule = ptr::null_mut();
        unsafe {
            let result = cuda_sys::cuModuleLoad(&mut module, path.as_ptr());
            if result != cuda_sys::CUresult::CUDA_SUCCESS {
                return Err(TuneError::LoadFailure(format!(
                    "cuModuleLoad failed for {}: {:?}",
                    binary.display(),
                    result
                )));
            }
        }

        Ok(CudaModule {
            module,
            _ctx: Arc::clone(&self.ctx),
        })
    }
}

/// A cubin loaded into a context; unloaded on drop.
pub struct CudaModule {
    module: cuda_sys::CUmodule,
    // Keeps the context alive until the module is unloaded.
    _ctx: Arc<CudaContext>,
}

impl CudaModule {
    fn function_attribute(
        func: cuda_sys::CUfunction,
        attrib: cuda_sys::CUfunction_attribute,
        kernel_name: &str,
    ) -> Result<i32> {
        let mut value: i32 = 0;
        unsafe {
            let result = cuda_sys::cuFuncGetAttribute(&mut value, attrib, func);
            if result != cuda_sys::CUresult::CUDA_SUCCESS {
                return Err(TuneError::Driver(format!(
                    "cuFuncGetAttribute failed for '{}': {:?}",
                    kernel_name, result
                )));
            }
        }
        Ok(value)
    }
}

impl LoadedModule for CudaModule {
    fn kernel_resources(&self, kernel_name: &str) -> Result<Option<ResourceSample>> {
        let name = CString::new(kernel_name)
            .map_err(|e| TuneError::Driver(format!("Invalid kernel name: {}", e)))?;

        let mut func: cuda_sys::CUfunction = ptr::null_mut();
        unsafe {
            let result = cuda_sys::cuModuleGetFunction(&mut func, self.module, name.as_ptr());
            if result == cuda_sys::CUresult::CUDA_ERROR_NOT_FOUND {
                return Ok(None);
            }
            if result != cuda_sys::CUresult::CUDA_SUCCESS {
                return Err(TuneError::Driver(format!(
                    "cuModuleGetFunction failed for '{}': {:?}",
                    kernel_name, result
                )));
            }
        }

        let registers = Self::function_attribute(
            func,
            cuda_sys::CUfunction_attribute::CU_FUNC_ATTRIBUTE_NUM_REGS,
            kernel_name,
        )?;
        let shared_mem_bytes = Self::function_attribute(
            func,
            cuda_sys::CUfunction_attribute::CU_FUNC_ATTRIBUTE_SHARED_SIZE_BYTES,
            kernel_name,
        )?;

        Ok(Some(ResourceSample::new(
            registers.max(0) as u32,
            shared_mem_bytes.max(0) as u64,
        )))
    }
}

impl Drop for CudaModule {
    fn drop(&mut self) {
        // Errors are ignored during cleanup.
        unsafe {
            let _ = cuda_sys::cuModuleUnload(self.module);
        }
    }
}
