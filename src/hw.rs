//! Hardware-accelerated decoding plumbing.
//!
//! This module wraps FFmpeg's hardware device machinery: enumerating the
//! device types a codec can decode through, creating a device context to
//! attach to a codec session, and classifying pixel formats during
//! `get_format` negotiation (is this a GPU surface format, and which device
//! type does it belong to?).
//!
//! Hardware availability depends on both the FFmpeg build and the host's
//! GPU drivers. Setup failures are never fatal; the pipeline falls back to
//! software decoding.

use ffmpeg_next::codec;
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVCodecHWConfig, AVHWDeviceType,
    AVPixelFormat,
};

use crate::error::PlayheadError;

/// Supported hardware device types for accelerated decoding.
///
/// Not all types are available on all platforms; consult
/// [`available_devices`] and [`codec_devices`] before relying on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareDeviceType {
    /// NVIDIA CUDA (Linux, Windows).
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows).
    Dxva2,
    /// Direct3D 11 Video Acceleration (Windows).
    D3d11va,
    /// Apple VideoToolbox (macOS, iOS).
    VideoToolbox,
    /// Intel Quick Sync Video (cross-platform).
    Qsv,
}

impl HardwareDeviceType {
    pub(crate) fn to_av_hw_device_type(self) -> AVHWDeviceType {
        match self {
            HardwareDeviceType::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
            HardwareDeviceType::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            HardwareDeviceType::Dxva2 => AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2,
            HardwareDeviceType::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
            HardwareDeviceType::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            HardwareDeviceType::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        }
    }

    fn from_av_hw_device_type(device_type: AVHWDeviceType) -> Option<Self> {
        match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDeviceType::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDeviceType::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HardwareDeviceType::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDeviceType::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => {
                Some(HardwareDeviceType::VideoToolbox)
            }
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDeviceType::Qsv),
            _ => None,
        }
    }
}

/// List all hardware device types supported by the FFmpeg build.
pub fn available_devices() -> Vec<HardwareDeviceType> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }

        if let Some(device) = HardwareDeviceType::from_av_hw_device_type(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// List the hardware device types a codec can decode through, in the
/// codec's own preference order.
///
/// Only device-context based configurations count; other acceleration
/// methods are of no use to this pipeline.
pub fn codec_devices(codec: codec::Id) -> Vec<HardwareDeviceType> {
    let codec_ptr = unsafe { ffmpeg_sys_next::avcodec_find_decoder(codec.into()) };
    let mut devices = Vec::new();
    if codec_ptr.is_null() {
        return devices;
    }

    let mut index: i32 = 0;

    loop {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec_ptr, index) };
        if config.is_null() {
            break;
        }

        let methods = unsafe { (*config).methods };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0 {
            let device_type = unsafe { (*config).device_type };
            if let Some(device) = HardwareDeviceType::from_av_hw_device_type(device_type) {
                if !devices.contains(&device) {
                    devices.push(device);
                }
            }
        }

        index += 1;
    }

    devices
}

/// Create an FFmpeg hardware device context for `device`.
///
/// Returns a raw `AVBufferRef*` owning one reference; the caller must
/// release it with `av_buffer_unref` once it has been attached elsewhere.
pub(crate) fn create_device_context(
    device: HardwareDeviceType,
) -> Result<*mut AVBufferRef, PlayheadError> {
    let mut device_context: *mut AVBufferRef = std::ptr::null_mut();

    let result = unsafe {
        ffmpeg_sys_next::av_hwdevice_ctx_create(
            &mut device_context,
            device.to_av_hw_device_type(),
            std::ptr::null(),
            std::ptr::null_mut(),
            0,
        )
    };

    if result < 0 {
        Err(PlayheadError::Codec(format!(
            "Failed to create {device:?} hardware device context (result={result})"
        )))
    } else {
        Ok(device_context)
    }
}

/// Whether `format` is a GPU surface format rather than system memory.
pub(crate) fn is_hardware_format(format: AVPixelFormat) -> bool {
    let descriptor = unsafe { ffmpeg_sys_next::av_pix_fmt_desc_get(format) };
    if descriptor.is_null() {
        return false;
    }

    unsafe { (*descriptor).flags & ffmpeg_sys_next::AV_PIX_FMT_FLAG_HWACCEL as u64 != 0 }
}

/// The hardware device type a GPU surface format belongs to.
///
/// Returns `None` for software formats and for surface formats of device
/// types this pipeline does not drive.
pub(crate) fn device_type_for_format(format: AVPixelFormat) -> Option<HardwareDeviceType> {
    match format {
        AVPixelFormat::AV_PIX_FMT_CUDA => Some(HardwareDeviceType::Cuda),
        AVPixelFormat::AV_PIX_FMT_VAAPI => Some(HardwareDeviceType::Vaapi),
        AVPixelFormat::AV_PIX_FMT_DXVA2_VLD => Some(HardwareDeviceType::Dxva2),
        AVPixelFormat::AV_PIX_FMT_D3D11 => Some(HardwareDeviceType::D3d11va),
        AVPixelFormat::AV_PIX_FMT_VIDEOTOOLBOX => Some(HardwareDeviceType::VideoToolbox),
        AVPixelFormat::AV_PIX_FMT_QSV => Some(HardwareDeviceType::Qsv),
        _ => None,
    }
}
