// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! FFI bindings to libjpeg-turbo's `TurboJPEG` API.
//!
//! This module provides a safe Rust wrapper around the `TurboJPEG` C API
//! for high-performance JPEG decompression.

use super::RgbImage;
use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uchar, c_ulong};

/// RGB pixel format (red, green, blue)
pub const TJPF_RGB: c_int = 0;

// Opaque TurboJPEG handle
type TjHandle = *mut c_void;

// External C functions from libjpeg-turbo
#[link(name = "turbojpeg")]
extern "C" {
    fn tjInitDecompress() -> TjHandle;
    fn tjDestroy(handle: TjHandle) -> c_int;
    fn tjDecompressHeader3(
        handle: TjHandle,
        jpeg_buf: *const c_uchar,
        jpeg_size: c_ulong,
        width: *mut c_int,
        height: *mut c_int,
        jpeg_subsamp: *mut c_int,
        jpeg_colorspace: *mut c_int,
    ) -> c_int;
    fn tjDecompress2(
        handle: TjHandle,
        jpeg_buf: *const c_uchar,
        jpeg_size: c_ulong,
        dst_buf: *mut c_uchar,
        width: c_int,
        pitch: c_int,
        height: c_int,
        pixel_format: c_int,
        flags: c_int,
    ) -> c_int;
    fn tjGetErrorStr2(handle: TjHandle) -> *const c_char;
}

/// Safe Rust wrapper for `TurboJPEG` decompression.
pub struct TurboJpegDecoder {
    handle: TjHandle,
}

impl TurboJpegDecoder {
    /// Creates a new `TurboJPEG` decoder.
    pub fn new() -> Result<Self, String> {
        let handle = unsafe { tjInitDecompress() };
        if handle.is_null() {
            return Err("Failed to initialize TurboJPEG decompressor".to_string());
        }
        Ok(Self { handle })
    }

    /// Decompresses a JPEG image to packed RGB.
    ///
    /// # Arguments
    /// * `jpeg` - Complete JPEG data
    ///
    /// # Returns
    /// The decoded image, 3 bytes per pixel
    #[allow(clippy::cast_sign_loss)] // Dimensions are checked positive first
    pub fn decompress_rgb(&mut self, jpeg: &[u8]) -> Result<RgbImage, String> {
        let mut width: c_int = 0;
        let mut height: c_int = 0;
        let mut subsamp: c_int = 0;
        let mut colorspace: c_int = 0;

        let result = unsafe {
            tjDecompressHeader3(
                self.handle,
                jpeg.as_ptr(),
                jpeg.len() as c_ulong,
                &mut width,
                &mut height,
                &mut subsamp,
                &mut colorspace,
            )
        };
        if result != 0 {
            let error_msg = self.get_error_string();
            return Err(format!("TurboJPEG header read failed: {error_msg}"));
        }
        if width <= 0 || height <= 0 {
            return Err(format!("Invalid JPEG dimensions {width}x{height}"));
        }

        let mut data = vec![0u8; width as usize * height as usize * 3];
        let result = unsafe {
            tjDecompress2(
                self.handle,
                jpeg.as_ptr(),
                jpeg.len() as c_ulong,
                data.as_mut_ptr(),
                width,
                0, // pitch = 0 means width * pixel_size
                height,
                TJPF_RGB,
                0, // flags
            )
        };
        if result != 0 {
            let error_msg = self.get_error_string();
            return Err(format!("TurboJPEG decompression failed: {error_msg}"));
        }

        Ok(RgbImage {
            width: width as u32,
            height: height as u32,
            data,
        })
    }

    /// Gets the last error message from `TurboJPEG`.
    fn get_error_string(&self) -> String {
        unsafe {
            let c_str = tjGetErrorStr2(self.handle);
            if c_str.is_null() {
                return "Unknown error".to_string();
            }
            std::ffi::CStr::from_ptr(c_str)
                .to_string_lossy()
                .into_owned()
        }
    }
}

impl Drop for TurboJpegDecoder {
    fn drop(&mut self) {
        unsafe {
            tjDestroy(self.handle);
        }
    }
}

unsafe impl Send for TurboJpegDecoder {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_creation() {
        let decoder = TurboJpegDecoder::new();
        assert!(decoder.is_ok());
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut decoder = TurboJpegDecoder::new().unwrap();
        assert!(decoder.decompress_rgb(&[0xFF, 0xD8, 0xFF]).is_err());
    }
}
