//! # Convolution Shape Utilities
//!
//! Output-size arithmetic for the square, undilated convs and pools used here.

/// Predict the output size of an undilated conv (or floor-mode pool) along one axis.
///
/// ```text
/// out_size = floor( (in_size + 2*padding - kernel_size) / stride ) + 1
/// ```
///
/// Returns `None` when the padded input is smaller than the kernel.
pub fn conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);

    let padded = input_size + 2 * padding;
    if input_size == 0 || padded < kernel_size {
        return None;
    }
    Some((padded - kernel_size) / stride + 1)
}

/// Predict the output resolution of a square, undilated 2d conv.
///
/// # Panics
///
/// If either axis has no legal output size.
pub fn expect_conv_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> [usize; 2] {
    let [h, w] = input_resolution;
    match (
        conv_output_size(h, kernel_size, stride, padding),
        conv_output_size(w, kernel_size, stride, padding),
    ) {
        (Some(oh), Some(ow)) => [oh, ow],
        _ => panic!(
            "No legal output size for conv with:\n input_resolution:{input_resolution:?}\n kernel_size:{kernel_size}\n stride:{stride}\n padding:{padding}",
        ),
    }
}

/// Predict the output size of an unpadded 1D pooling operation with ceil rounding.
///
/// ```text
/// out_size = ceil( (in_size - kernel_size) / stride ) + 1
/// ```
///
/// Windows may hang off the trailing edge, but each must start inside the input;
/// returns `None` when no window does.
pub fn maybe_pool1d_ceil_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);

    if input_size == 0 || input_size + stride <= kernel_size {
        return None;
    }
    Some(input_size.saturating_sub(kernel_size).div_ceil(stride) + 1)
}

/// Get the output resolution of a "same"-padded layer with a given stride.
///
/// Every strided layer in the network (`3x3` conv with padding 1, `3x3` pools
/// with padding 1, and `2x2` ceil-mode pools) maps an axis of size `n`
/// to `ceil(n / stride)`.
///
/// # Returns
///
/// ``[ceil(in_height / stride), ceil(in_width / stride)]``
#[inline(always)]
pub fn ceil_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    assert!(stride > 0, "stride must be > 0");
    input_resolution.map(|size| size.div_ceil(stride))
}
