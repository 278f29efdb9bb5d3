//! # `AvgPool2dCeil`
//!
//! Unpadded 2d average pooling with ceil-mode output rounding.
//!
//! Windows that hang off the bottom/right edge are averaged over the
//! in-bounds elements only. This is the pooling step of the "vd"
//! downsampling path, where a ``2x2 / stride 2`` pool halves the
//! resolution of odd-sized inputs without dropping the last row/column.

use crate::utility::conv_shape::maybe_pool1d_ceil_output_size;
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`AvgPool2dCeil`] Config.
#[derive(Config, Debug)]
pub struct AvgPool2dCeilConfig {
    /// The size of the pooling window.
    pub kernel_size: [usize; 2],

    /// The strides of the pooling window.
    #[config(default = "[1, 1]")]
    pub strides: [usize; 2],
}

impl AvgPool2dCeilConfig {
    /// Initialize an [`AvgPool2dCeil`].
    pub fn init(&self) -> AvgPool2dCeil {
        AvgPool2dCeil {
            pool: AvgPool2dConfig::new(self.kernel_size)
                .with_strides(self.strides)
                .init(),
        }
    }
}

/// Ceil-mode, exclusive-count, 2d average pooling.
#[derive(Module, Clone, Debug)]
pub struct AvgPool2dCeil {
    pool: AvgPool2d,
}

impl AvgPool2dCeil {
    /// The pooling window size.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.pool.kernel_size
    }

    /// The pooling strides.
    pub fn strides(&self) -> [usize; 2] {
        self.pool.stride
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the window does not fit the input.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let [kh, kw] = self.kernel_size();
        let [sh, sw] = self.strides();
        let [h, w] = input_resolution;
        match (
            maybe_pool1d_ceil_output_size(h, kh, sh),
            maybe_pool1d_ceil_output_size(w, kw, sw),
        ) {
            (Some(oh), Some(ow)) => [oh, ow],
            _ => panic!(
                "No legal output size for pool with:\n input_resolution:{input_resolution:?}\n kernel_size:{:?}\n strides:{:?}",
                self.kernel_size(),
                self.strides(),
            ),
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, out_height, out_width]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, h, w] = input.dims();
        let [oh, ow] = self.output_resolution([h, w]);
        let [kh, kw] = self.kernel_size();
        let [sh, sw] = self.strides();

        let pad_h = ((oh - 1) * sh + kh).saturating_sub(h);
        let pad_w = ((ow - 1) * sw + kw).saturating_sub(w);

        if pad_h == 0 && pad_w == 0 {
            return self.pool.forward(input);
        }

        // Pool zero-padded sums, then rescale by the in-bounds counts.
        let counts = input.ones_like().pad((0, pad_w, 0, pad_h), 0.0);
        let x = input.pad((0, pad_w, 0, pad_h), 0.0);

        self.pool.forward(x) / self.pool.forward(counts)
    }
}
