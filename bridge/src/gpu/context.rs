/// GPU context management - handles wgpu adapter/device/queue initialization
use common::BridgeError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::gpu_error;

/// GPU context containing device, queue, and adapter info
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    pub adapter_info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
    device_lost: Arc<AtomicBool>,
    /// First error raised by the device outside of a returned `Result`
    device_error: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    /// Create a context able to drive `surface`, or a headless one when `None`.
    ///
    /// On Linux this will typically pick Vulkan.
    pub async fn new(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, BridgeError> {
        log::info!("Initializing GPU context...");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| gpu_error!(GpuInit, "no suitable GPU adapter", e))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("edb device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                ..Default::default()
            })
            .await
            .map_err(|e| gpu_error!(GpuInit, "create GPU device", e))?;

        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
            lost_flag.store(true, Ordering::Release);
        });

        // The default handler panics; keep the error for `check_device` instead
        let device_error = Arc::new(Mutex::new(None));
        let error_slot = Arc::clone(&device_error);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            log::error!("GPU error: {}", error);
            if let Ok(mut slot) = error_slot.lock() {
                slot.get_or_insert_with(|| error.to_string());
            }
        }));

        let limits = device.limits();
        log::info!("GPU context initialized");
        log::debug!(
            "  Max Texture Size: {}x{}",
            limits.max_texture_dimension_2d,
            limits.max_texture_dimension_2d
        );

        Ok(Self {
            device,
            queue,
            adapter,
            adapter_info,
            limits,
            device_lost,
            device_error,
        })
    }

    /// Context without a presentation surface, used for offscreen rendering.
    pub async fn headless() -> Result<Self, BridgeError> {
        let instance = wgpu::Instance::default();
        Self::new(&instance, None).await
    }

    /// Whether the device reported itself removed/lost.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Error the device reported asynchronously (out of memory, validation).
    pub fn device_error(&self) -> Option<String> {
        self.device_error
            .lock()
            .map_or_else(|e| e.into_inner().clone(), |slot| slot.clone())
    }

    /// Fail with `DeviceLost` once the device is gone, or with
    /// `ResourceCreation` once a GPU call failed.
    ///
    /// Called after every resource creation, so a failed allocation is
    /// reported by the call that caused it.
    pub fn check_device(&self) -> Result<(), BridgeError> {
        if self.is_device_lost() {
            return Err(BridgeError::DeviceLost(format!(
                "adapter {} stopped responding",
                self.adapter_info.name
            )));
        }
        if let Some(error) = self.device_error() {
            return Err(BridgeError::ResourceCreation(error));
        }
        Ok(())
    }

    /// Fail with `ResourceCreation` if a texture of this size cannot exist.
    pub fn check_texture_size(&self, width: u32, height: u32) -> Result<(), BridgeError> {
        let max = self.limits.max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BridgeError::ResourceCreation(format!(
                "texture size {}x{} outside 1..={}",
                width, height, max
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("device_lost", &self.is_device_lost())
            .field("device_error", &self.device_error())
            .finish()
    }
}
