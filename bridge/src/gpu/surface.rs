//! Presentation surface: configuration, present-mode policy and resize

use common::BridgeError;

use super::GpuContext;

/// Pick the present mode for the current vsync setting.
///
/// With vsync the frame waits for the display refresh (`Fifo`, always
/// available). Without it the lowest-latency mode wins: `Immediate` allows
/// tearing where the platform supports it, then `Mailbox`, then `Fifo`.
pub fn select_present_mode(supported: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
        .into_iter()
        .find(|mode| supported.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

/// New present mode when toggling vsync requires reconfiguring, `None` when
/// the resolved mode stays the same.
pub fn present_mode_change(
    supported: &[wgpu::PresentMode],
    current: wgpu::PresentMode,
    vsync: bool,
) -> Option<wgpu::PresentMode> {
    let mode = select_present_mode(supported, vsync);
    (mode != current).then_some(mode)
}

/// Prefer a linear 8-bit format so frame values are displayed unaltered.
pub fn select_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
        .into_iter()
        .find(|format| formats.contains(format))
        .or_else(|| formats.iter().copied().find(|f| !f.is_srgb()))
        .or_else(|| formats.first().copied())
}

pub struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    present_modes: Vec<wgpu::PresentMode>,
    vsync: bool,
    configured: bool,
}

impl SurfaceTarget {
    pub fn new(
        surface: wgpu::Surface<'static>,
        context: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self, BridgeError> {
        let caps = surface.get_capabilities(&context.adapter);
        let format = select_format(&caps.formats).ok_or_else(|| {
            BridgeError::GpuInit("surface is not supported by the adapter".to_string())
        })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = select_present_mode(&caps.present_modes, vsync);
        log::info!(
            "Surface format {:?}, present mode {:?} (supported: {:?})",
            format,
            present_mode,
            caps.present_modes
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            desired_maximum_frame_latency: 1,
            alpha_mode,
            view_formats: vec![],
        };

        let mut target = Self {
            surface,
            config,
            present_modes: caps.present_modes,
            vsync,
            configured: false,
        };
        target.configure(context)?;
        Ok(target)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        self.config.present_mode
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// New output size. Only the swapchain is rebuilt; a zero size (minimised
    /// window) leaves the surface unconfigured until it becomes visible again.
    pub fn resize(&mut self, context: &GpuContext, width: u32, height: u32) -> Result<(), BridgeError> {
        if (width, height) == self.size() && self.configured {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.configure(context)
    }

    /// Switch the present mode. Returns whether the surface was reconfigured.
    pub fn set_vsync(&mut self, context: &GpuContext, vsync: bool) -> Result<bool, BridgeError> {
        self.vsync = vsync;
        let Some(mode) = present_mode_change(&self.present_modes, self.config.present_mode, vsync)
        else {
            return Ok(false);
        };
        log::info!(
            "Present mode {:?} -> {:?}",
            self.config.present_mode,
            mode
        );
        self.config.present_mode = mode;
        self.configure(context)?;
        Ok(true)
    }

    /// Next back buffer, or `None` when this iteration should be skipped.
    pub fn acquire(
        &mut self,
        context: &GpuContext,
    ) -> Result<Option<wgpu::SurfaceTexture>, BridgeError> {
        if !self.configured {
            return Ok(None);
        }

        match self.surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.configure(context)?;
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::trace!("Surface acquire timed out");
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(BridgeError::Surface(
                "out of memory acquiring back buffer".to_string(),
            )),
            Err(e) => Err(BridgeError::Surface(e.to_string())),
        }
    }

    fn configure(&mut self, context: &GpuContext) -> Result<(), BridgeError> {
        if self.config.width == 0 || self.config.height == 0 {
            self.configured = false;
            return Ok(());
        }
        log::debug!(
            "Configuring surface {}x{} ({:?})",
            self.config.width,
            self.config.height,
            self.config.present_mode
        );
        self.surface.configure(&context.device, &self.config);
        context.check_device().map_err(|e| match e {
            BridgeError::ResourceCreation(message) => {
                BridgeError::Surface(format!("configure surface: {}", message))
            }
            other => other,
        })?;
        self.configured = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::PresentMode;

    #[test]
    fn test_vsync_uses_fifo() {
        let all = [PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo];
        assert_eq!(select_present_mode(&all, true), PresentMode::Fifo);
    }

    #[test]
    fn test_no_vsync_prefers_tearing() {
        let all = [PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate];
        assert_eq!(select_present_mode(&all, false), PresentMode::Immediate);
    }

    #[test]
    fn test_no_vsync_falls_back() {
        let no_tearing = [PresentMode::Fifo, PresentMode::Mailbox];
        assert_eq!(select_present_mode(&no_tearing, false), PresentMode::Mailbox);
        assert_eq!(select_present_mode(&[PresentMode::Fifo], false), PresentMode::Fifo);
        assert_eq!(select_present_mode(&[], false), PresentMode::Fifo);
    }

    #[test]
    fn test_vsync_toggle_reconfigures_only_on_mode_change() {
        let all = [PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate];
        assert_eq!(
            present_mode_change(&all, PresentMode::Immediate, true),
            Some(PresentMode::Fifo)
        );
        assert_eq!(
            present_mode_change(&all, PresentMode::Fifo, false),
            Some(PresentMode::Immediate)
        );
        assert_eq!(present_mode_change(&all, PresentMode::Fifo, true), None);

        // Fifo-only platforms never reconfigure
        let fifo = [PresentMode::Fifo];
        assert_eq!(present_mode_change(&fifo, PresentMode::Fifo, false), None);
        assert_eq!(present_mode_change(&fifo, PresentMode::Fifo, true), None);
    }

    #[test]
    fn test_format_prefers_linear() {
        use wgpu::TextureFormat::*;
        assert_eq!(select_format(&[Bgra8UnormSrgb, Bgra8Unorm]), Some(Bgra8Unorm));
        assert_eq!(select_format(&[Rgba8UnormSrgb, Rgba8Unorm]), Some(Rgba8Unorm));
        assert_eq!(select_format(&[Rgb10a2Unorm]), Some(Rgb10a2Unorm));
        assert_eq!(select_format(&[Bgra8UnormSrgb]), Some(Bgra8UnormSrgb));
        assert_eq!(select_format(&[]), None);
    }
}
