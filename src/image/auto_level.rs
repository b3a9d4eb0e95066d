//! 自动色阶
//!
//! 以接近黑色与接近白色的最多像素值为黑白点拉伸, 再做 gamma 校正

use candle_core::{Device, Tensor};
use log::debug;
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    core::category::CATEGORY_IMAGE,
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_FLOAT, NODE_IMAGE, NODE_INT},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum GammaMode {
    #[strum(to_string = "manual")]
    Manual,
    #[strum(to_string = "auto_median")]
    AutoMedian,
    #[strum(to_string = "auto_mean")]
    AutoMean,
}

/// 色阶参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelOptions {
    /// 0..=127
    pub black_threshold: u8,
    /// 128..=255
    pub white_threshold: u8,
    pub gamma_mode: GammaMode,
    pub gamma: f64,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            black_threshold: 30,
            white_threshold: 225,
            gamma_mode: GammaMode::AutoMedian,
            gamma: 1.0,
        }
    }
}

/// 0..1 的浮点转为 8 位, 向零取整
fn to_u8(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

/// 亮度直方图中的黑白点
///
/// pixels 为 [H * W * C] 的 8 位数据, 三通道按 BT.601 计算亮度, 其他取第一通道;
/// 并列最多时取最小值
pub fn find_black_white_points(
    pixels: &[u8],
    channels: usize,
    black_threshold: u8,
    white_threshold: u8,
) -> (u8, u8) {
    let mut histogram = [0usize; 256];
    for pixel in pixels.chunks_exact(channels.max(1)) {
        let gray = if channels == 3 {
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8
        } else {
            pixel[0]
        };
        histogram[gray as usize] += 1;
    }

    let most_frequent = |from: usize, to: usize| -> usize {
        let mut best = from;
        for value in from..=to {
            if histogram[value] > histogram[best] {
                best = value;
            }
        }
        best
    };

    let black = most_frequent(0, black_threshold as usize);
    let white = most_frequent(white_threshold as usize, 255);
    (black as u8, white as u8)
}

/// 由中间调估计 gamma
///
/// 只统计 (0.05, 0.95) 内的像素; 中间值在 [0.35, 0.65] 内或不大于 0.01 时不调整,
/// 否则向 0.5 靠近一半, 结果限制在 [0.6, 1.5]
pub fn auto_gamma(normalized: &[f32], mode: GammaMode) -> f64 {
    let mut valid = normalized
        .iter()
        .filter(|v| **v > 0.05 && **v < 0.95)
        .map(|v| *v as f64)
        .collect::<Vec<_>>();
    if valid.is_empty() {
        return 1.0;
    }

    let middle = match mode {
        GammaMode::AutoMean => valid.iter().sum::<f64>() / valid.len() as f64,
        _ => {
            valid.sort_by(f64::total_cmp);
            let mid = valid.len() / 2;
            if valid.len() % 2 == 0 {
                (valid[mid - 1] + valid[mid]) / 2.0
            } else {
                valid[mid]
            }
        }
    };

    if (0.35..=0.65).contains(&middle) || middle <= 0.01 {
        return 1.0;
    }

    let target = 0.5 + (middle - 0.5) * 0.5;
    (middle.ln() / target.ln()).clamp(0.6, 1.5)
}

/// 单张图片 [H * W * C] 的色阶调整, 输出量化为 8 位后的 0..1 浮点
pub fn auto_level_pixels(pixels: &[f32], channels: usize, options: &LevelOptions) -> Vec<f32> {
    let bytes = pixels.iter().map(|v| to_u8(*v)).collect::<Vec<_>>();
    let (black, white) = find_black_white_points(
        &bytes,
        channels,
        options.black_threshold,
        options.white_threshold,
    );
    let (black, mut white) = (black as f32, white as f32);
    if black >= white {
        white = black + 1.0;
    }

    let normalized = bytes
        .iter()
        .map(|v| ((*v as f32 - black) / (white - black)).clamp(0.0, 1.0))
        .collect::<Vec<_>>();

    let gamma = match options.gamma_mode {
        GammaMode::Manual => options.gamma,
        mode => auto_gamma(&normalized, mode),
    };
    debug!("auto level: black {black}, white {white}, gamma {gamma:.3}");

    let exponent = 1.0 / gamma;
    normalized
        .iter()
        .map(|v| ((*v as f64).powf(exponent) * 255.0).floor() as f32 / 255.0)
        .collect()
}

/// 批量处理 [B, H, W, C]
pub fn auto_level(image: &Tensor, options: &LevelOptions) -> Result<Tensor, Error> {
    let (batch, height, width, channels) = image.dims4()?;

    let mut output = Vec::with_capacity(batch * height * width * channels);
    for index in 0..batch {
        let pixels = image.get(index)?.flatten_all()?.to_vec1::<f32>()?;
        output.extend(auto_level_pixels(&pixels, channels, options));
    }

    Ok(Tensor::from_vec(
        output,
        (batch, height, width, channels),
        image.device(),
    )?)
}

/// 自动色阶
#[pyclass(subclass)]
pub struct AutoLevelNode {
    device: Device,
}

impl PromptServer for AutoLevelNode {}

#[pymethods]
impl AutoLevelNode {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_IMAGE,)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Auto-level an image by finding prevalent near-black and near-white pixels and stretching them to pure black and white."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let defaults = LevelOptions::default();
            let int_range = |default: u8, min: u8, max: u8| -> PyResult<Bound<'_, PyDict>> {
                let options = PyDict::new(py);
                options.set_item("default", default)?;
                options.set_item("min", min)?;
                options.set_item("max", max)?;
                options.set_item("step", 1)?;
                Ok(options)
            };

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("image", (NODE_IMAGE,))?;
                required.set_item(
                    "black_threshold",
                    (NODE_INT, int_range(defaults.black_threshold, 0, 127)?),
                )?;
                required.set_item(
                    "white_threshold",
                    (NODE_INT, int_range(defaults.white_threshold, 128, 255)?),
                )?;
                required.set_item(
                    "gamma_mode",
                    (
                        GammaMode::iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                        {
                            let gamma_mode = PyDict::new(py);
                            gamma_mode.set_item("default", defaults.gamma_mode.to_string())?;
                            gamma_mode
                        },
                    ),
                )?;
                required.set_item(
                    "gamma",
                    (NODE_FLOAT, {
                        let gamma = PyDict::new(py);
                        gamma.set_item("default", defaults.gamma)?;
                        gamma.set_item("min", 0.1)?;
                        gamma.set_item("max", 3.0)?;
                        gamma.set_item("step", 0.01)?;
                        gamma
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        image: Bound<'py, PyAny>,
        black_threshold: u8,
        white_threshold: u8,
        gamma_mode: &str,
        gamma: f64,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let results = self.level(py, &image, black_threshold, white_threshold, gamma_mode, gamma);
        match results {
            Ok(v) => Ok((v,)),
            Err(e) => Err(self.raise_error(py, "AutoLevelNode", e)),
        }
    }
}

impl AutoLevelNode {
    fn level<'py>(
        &self,
        py: Python<'py>,
        image: &Bound<'py, PyAny>,
        black_threshold: u8,
        white_threshold: u8,
        gamma_mode: &str,
        gamma: f64,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let gamma_mode = gamma_mode
            .parse::<GammaMode>()
            .map_err(|e| Error::ParseEnumString(format!("{gamma_mode}, {e}")))?;
        let options = LevelOptions {
            black_threshold,
            white_threshold,
            gamma_mode,
            gamma,
        };

        let image = TensorWrapper::<f32>::new(image, &self.device)?.into_tensor();
        let leveled = auto_level(&image, &options)?;
        Ok(TensorWrapper::<f32>::from_tensor(leveled).to_py_tensor(py)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 位值转为不会因截断而偏移的浮点
    fn level(value: u8) -> f32 {
        (value as f32 + 0.5) / 255.0
    }

    #[test]
    fn test_find_black_white_points() -> anyhow::Result<()> {
        let pixels = [10, 10, 12, 240, 240, 250, 128, 0];
        assert_eq!(find_black_white_points(&pixels, 1, 30, 225), (10, 240));

        // 并列时取较小值, 空区间取起点
        let pixels = [5, 7, 100];
        assert_eq!(find_black_white_points(&pixels, 1, 30, 225), (5, 225));

        // 三通道按亮度统计
        let rgb = [200, 200, 200, 20, 20, 20];
        let (black, white) = find_black_white_points(&rgb, 3, 127, 128);
        assert!((19..=20).contains(&black));
        assert!((199..=200).contains(&white));
        Ok(())
    }

    #[test]
    fn test_auto_gamma() -> anyhow::Result<()> {
        assert_eq!(auto_gamma(&[0.0, 1.0], GammaMode::AutoMedian), 1.0);
        assert_eq!(auto_gamma(&[0.5, 0.4, 0.6], GammaMode::AutoMedian), 1.0);

        // 偏暗: ln(0.3) / ln(0.4)
        let gamma = auto_gamma(&[0.3], GammaMode::AutoMedian);
        assert!((gamma - 0.3f64.ln() / 0.4f64.ln()).abs() < 1e-6);

        // 超出范围时截断
        assert_eq!(auto_gamma(&[0.2], GammaMode::AutoMedian), 1.5);
        assert_eq!(auto_gamma(&[0.8], GammaMode::AutoMedian), 0.6);

        // 中位数与均值不同
        let values = [0.1, 0.2, 0.9];
        assert_eq!(auto_gamma(&values, GammaMode::AutoMedian), 1.5);
        assert_eq!(auto_gamma(&values, GammaMode::AutoMean), 1.0);
        Ok(())
    }

    #[test]
    fn test_auto_level_stretches() -> anyhow::Result<()> {
        let pixels = [level(10), level(10), level(240), level(128)];
        let options = LevelOptions {
            gamma_mode: GammaMode::Manual,
            ..Default::default()
        };

        let output = auto_level_pixels(&pixels, 1, &options);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.0);
        assert_eq!(output[2], 1.0);
        // (128 - 10) / 230 * 255 = 130.8
        assert_eq!(output[3], 130.0 / 255.0);
        Ok(())
    }

    #[test]
    fn test_auto_level_batch() -> anyhow::Result<()> {
        let first = [level(10), level(10), level(240), level(128)];
        let second = [level(0), level(255), level(255), level(60)];
        let data = first.iter().chain(second.iter()).copied().collect::<Vec<_>>();
        let image = Tensor::from_vec(data, (2, 2, 2, 1), &Device::Cpu)?;

        let output = auto_level(&image, &LevelOptions::default())?;
        assert_eq!(output.dims4()?, (2, 2, 2, 1));

        let second = output.get(1)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(second[0], 0.0);
        assert_eq!(second[1], 1.0);
        Ok(())
    }
}
