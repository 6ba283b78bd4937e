use super::{check_device, DeviceBackend};
use crate::error::{Domain, HdvError, HdvResult, ToResult};
use crate::DeviceOrdinal;
use cuda_driver_sys::{self as cuda, CUcontext, CUdevice, CUdeviceptr, CUresult};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;
use tracing::debug;

struct PrimaryContext {
    device: CUdevice,
    context: CUcontext,
}

// The primary context handle is process-wide and may be made current on any thread.
unsafe impl Send for PrimaryContext {}

/// Backend driving NVIDIA GPUs through the CUDA driver API.
///
/// Each device is reached through its primary context, retained on first use and released when
/// the backend is dropped. Work addressing a device first makes that device's context current on
/// the calling thread.
pub struct CudaBackend {
    contexts: Vec<Mutex<Option<PrimaryContext>>>,
}

impl std::fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaBackend")
            .field("devices", &self.contexts.len())
            .finish()
    }
}

impl CudaBackend {
    /// Initializes the driver and enumerates the devices.
    pub fn new() -> HdvResult<Self> {
        unsafe {
            cuda::cuInit(0).to_result("cuInit")?;
            let mut count: c_int = 0;
            cuda::cuDeviceGetCount(&mut count as *mut c_int).to_result("cuDeviceGetCount")?;
            debug!(devices = count, "initialized CUDA driver");
            Ok(CudaBackend {
                contexts: (0..count.max(0)).map(|_| Mutex::new(None)).collect(),
            })
        }
    }

    fn make_current(&self, device: DeviceOrdinal) -> HdvResult<()> {
        check_device(self, device)?;
        let mut slot = self.contexts[device.index()].lock();
        let context = match &*slot {
            Some(primary) => primary.context,
            None => unsafe {
                let mut raw_device: CUdevice = 0;
                cuda::cuDeviceGet(&mut raw_device as *mut CUdevice, device.get() as c_int)
                    .to_result("cuDeviceGet")?;
                let mut context: CUcontext = ptr::null_mut();
                cuda::cuDevicePrimaryCtxRetain(&mut context as *mut CUcontext, raw_device)
                    .to_result("cuDevicePrimaryCtxRetain")?;
                *slot = Some(PrimaryContext {
                    device: raw_device,
                    context,
                });
                context
            },
        };
        unsafe { cuda::cuCtxSetCurrent(context).to_result("cuCtxSetCurrent") }
    }
}

impl DeviceBackend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn device_count(&self) -> usize {
        self.contexts.len()
    }

    fn select(&self, device: DeviceOrdinal) -> HdvResult<()> {
        self.make_current(device)
    }

    fn check_range(
        &self,
        device: DeviceOrdinal,
        address: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        self.make_current(device)?;
        let invalid = || HdvError::InvalidAddress {
            device,
            address: address as usize,
            len: bytes,
        };
        let mut base: CUdeviceptr = 0;
        let mut size: usize = 0;
        let result = unsafe {
            cuda::cuMemGetAddressRange_v2(
                &mut base as *mut CUdeviceptr,
                &mut size as *mut usize,
                address as usize as CUdeviceptr,
            )
        };
        if result != CUresult::CUDA_SUCCESS {
            return Err(invalid());
        }
        let end = (address as usize).checked_add(bytes).ok_or_else(invalid)?;
        if end <= base as usize + size {
            Ok(())
        } else {
            Err(invalid())
        }
    }

    unsafe fn malloc(&self, device: DeviceOrdinal, bytes: usize) -> HdvResult<*mut u8> {
        self.make_current(device)?;
        let mut dptr: CUdeviceptr = 0;
        match cuda::cuMemAlloc_v2(&mut dptr as *mut CUdeviceptr, bytes) {
            CUresult::CUDA_SUCCESS => Ok(dptr as usize as *mut u8),
            CUresult::CUDA_ERROR_OUT_OF_MEMORY => Err(HdvError::OutOfMemory {
                domain: Domain::Device,
                device: Some(device),
                requested: bytes,
            }),
            code => Err(HdvError::Driver {
                call: "cuMemAlloc",
                code: code as i64,
            }),
        }
    }

    unsafe fn free(&self, device: DeviceOrdinal, ptr: *mut u8) -> HdvResult<()> {
        self.make_current(device)?;
        cuda::cuMemFree_v2(ptr as usize as CUdeviceptr).to_result("cuMemFree")
    }

    unsafe fn copy_htod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        self.make_current(device)?;
        cuda::cuMemcpyHtoD_v2(dst as usize as CUdeviceptr, src as *const c_void, bytes)
            .to_result("cuMemcpyHtoD")
    }

    unsafe fn copy_dtoh(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        self.make_current(device)?;
        cuda::cuMemcpyDtoH_v2(dst as *mut c_void, src as usize as CUdeviceptr, bytes)
            .to_result("cuMemcpyDtoH")
    }

    unsafe fn copy_dtod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        self.make_current(device)?;
        cuda::cuMemcpyDtoD_v2(
            dst as usize as CUdeviceptr,
            src as usize as CUdeviceptr,
            bytes,
        )
        .to_result("cuMemcpyDtoD")
    }
}

impl Drop for CudaBackend {
    fn drop(&mut self) {
        for slot in &self.contexts {
            if let Some(primary) = slot.lock().take() {
                // Nothing useful can be done with a failure here.
                let _ = unsafe { cuda::cuDevicePrimaryCtxRelease(primary.device) };
            }
        }
    }
}
