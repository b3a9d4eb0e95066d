//! 保存图片 (管道)
//!
//! 取管道中的图片, 提示词, 模型与种子作为元数据, 交给 comfy-image-saver 的
//! "Image Saver" 节点保存并预览

use log::{info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    error::Error,
    pipe::full_pipe::{FullPipe, Pipe},
    wrapper::{
        comfy::node_class::NodeClass,
        comfyui::{
            types::{NODE_BOOLEAN, NODE_FULL_PIPE, NODE_IMAGE, NODE_STRING},
            PromptServer,
        },
    },
};

/// 外部保存节点
pub const IMAGE_SAVER: &str = "Image Saver";

/// 可选的保存格式
pub const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "tiff"];

const FILENAME_TOOLTIP: &str = "filename (available variables: %date, %time, %model, %width, \
    %height, %seed, %counter, %sampler_name, %steps, %cfg, %scheduler, %basemodelname, \
    %denoise, %clip_skip)";

/// 写入图片的 a1111 元数据
#[derive(Debug, Clone, PartialEq)]
pub struct SaveMetadata {
    pub model_name: String,
    pub positive: String,
    pub negative: String,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
}

impl SaveMetadata {
    /// 关闭 a1111 元数据时文本为空, 种子为 0
    pub fn from_pipe<H: Clone>(pipe: &Pipe<H>, a1111_metadata: bool, (width, height): (usize, usize)) -> Self {
        if !a1111_metadata {
            return Self {
                model_name: String::new(),
                positive: String::new(),
                negative: String::new(),
                seed: 0,
                width,
                height,
            };
        }

        Self {
            model_name: pipe.ckpt_name.clone().unwrap_or_else(|| "unknown".to_string()),
            positive: pipe.positive_text.clone().unwrap_or_default(),
            negative: pipe.negative_text.clone().unwrap_or_default(),
            seed: pipe.seed_or_default(),
            width,
            height,
        }
    }

    /// Image Saver 的关键字参数, 采样设置使用固定值
    pub fn saver_kwargs<'py>(
        &self,
        py: Python<'py>,
        filename_prefix: &str,
        path: &str,
        extension: &str,
    ) -> PyResult<Bound<'py, PyDict>> {
        let kwargs = PyDict::new(py);
        kwargs.set_item("filename", filename_prefix)?;
        kwargs.set_item("path", path)?;
        kwargs.set_item("extension", extension)?;
        kwargs.set_item("steps", 20)?;
        kwargs.set_item("cfg", 7.0)?;
        kwargs.set_item("modelname", &self.model_name)?;
        kwargs.set_item("sampler_name", "")?;
        kwargs.set_item("scheduler_name", "normal")?;
        kwargs.set_item("positive", &self.positive)?;
        kwargs.set_item("negative", &self.negative)?;
        kwargs.set_item("seed_value", self.seed)?;
        kwargs.set_item("width", self.width)?;
        kwargs.set_item("height", self.height)?;
        kwargs.set_item("lossless_webp", true)?;
        kwargs.set_item("quality_jpeg_or_webp", 100)?;
        kwargs.set_item("optimize_png", false)?;
        kwargs.set_item("counter", 0)?;
        kwargs.set_item("denoise", 1.0)?;
        kwargs.set_item("clip_skip", 0)?;
        kwargs.set_item("time_format", "%Y-%m-%d-%H%M%S")?;
        kwargs.set_item("save_workflow_as_json", false)?;
        kwargs.set_item("embed_workflow", true)?;
        kwargs.set_item("additional_hashes", "")?;
        kwargs.set_item("download_civitai_data", false)?;
        kwargs.set_item("easy_remix", false)?;
        kwargs.set_item("show_preview", true)?;
        kwargs.set_item("custom", "")?;
        Ok(kwargs)
    }
}

/// 保存结果中的界面提示
fn ui_text<'py>(py: Python<'py>, text: &str) -> PyResult<Bound<'py, PyDict>> {
    let ui = PyDict::new(py);
    ui.set_item("text", vec![text])?;
    let dict = PyDict::new(py);
    dict.set_item("ui", ui)?;
    Ok(dict)
}

#[pyclass(subclass)]
pub struct SaveFullPipe {}

impl PromptServer for SaveFullPipe {}

#[pymethods]
impl SaveFullPipe {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_NODE")]
    fn output_node() -> bool {
        true
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_IMAGE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("image",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PIPE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Save image from pipe with metadata and preview."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let option = |default: Option<&str>, tooltip: &str| -> PyResult<Bound<'_, PyDict>> {
                let option = PyDict::new(py);
                if let Some(default) = default {
                    option.set_item("default", default)?;
                }
                option.set_item("tooltip", tooltip)?;
                Ok(option)
            };
            let toggle = |tooltip: &str| -> PyResult<Bound<'_, PyDict>> {
                let toggle = PyDict::new(py);
                toggle.set_item("default", true)?;
                toggle.set_item("tooltip", tooltip)?;
                Ok(toggle)
            };

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("full_pipe", (NODE_FULL_PIPE,))?;
                required.set_item(
                    "filename_prefix",
                    (NODE_STRING, option(Some("%time_%seed"), FILENAME_TOOLTIP)?),
                )?;
                required.set_item(
                    "path",
                    (
                        NODE_STRING,
                        option(Some("%date"), "path to save the images (under Comfy's save directory)")?,
                    ),
                )?;
                required.set_item(
                    "extension",
                    (
                        EXTENSIONS.to_vec(),
                        option(None, "file extension/type to save image as")?,
                    ),
                )?;
                required.set_item(
                    "a1111_metadata",
                    (NODE_BOOLEAN, toggle("Save a1111-formatted metadata to image")?),
                )?;
                required.set_item(
                    "comfyui_workflow",
                    (NODE_BOOLEAN, toggle("Save ComfyUI workflow to image")?),
                )?;
                required
            })?;
            dict.set_item("hidden", {
                let hidden = PyDict::new(py);
                hidden.set_item("prompt", "PROMPT")?;
                hidden.set_item("extra_pnginfo", "EXTRA_PNGINFO")?;
                hidden
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            full_pipe,
            filename_prefix,
            path,
            extension,
            a1111_metadata,
            comfyui_workflow,
            prompt=None,
            extra_pnginfo=None
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: Bound<'py, FullPipe>,
        filename_prefix: &str,
        path: &str,
        extension: &str,
        a1111_metadata: bool,
        comfyui_workflow: bool,
        prompt: Option<Bound<'py, PyAny>>,
        extra_pnginfo: Option<Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        // 关闭工作流时不写入 prompt 与 extra_pnginfo
        let workflow = if comfyui_workflow {
            (prompt, extra_pnginfo)
        } else {
            (None, None)
        };
        let results = self.save(
            py,
            full_pipe.get(),
            filename_prefix,
            path,
            extension,
            a1111_metadata,
            workflow,
        );
        results.map_err(|e| self.raise_error(py, "SaveFullPipe", e))
    }
}

impl SaveFullPipe {
    #[allow(clippy::too_many_arguments)]
    fn save<'py>(
        &self,
        py: Python<'py>,
        full_pipe: &FullPipe,
        filename_prefix: &str,
        path: &str,
        extension: &str,
        a1111_metadata: bool,
        (prompt, extra_pnginfo): (Option<Bound<'py, PyAny>>, Option<Bound<'py, PyAny>>),
    ) -> Result<Bound<'py, PyDict>, Error> {
        let pipe = &full_pipe.inner;
        let Some(image) = pipe.image.as_ref().map(|image| image.bind(py).clone()) else {
            return self.skip(py, "No image in pipe");
        };

        let Some(saver) = NodeClass::resolve_optional(py, IMAGE_SAVER)? else {
            return self.skip(py, &format!("{IMAGE_SAVER} node not found"));
        };

        // [B, H, W, C]
        let shape = image.getattr("shape")?.extract::<Vec<usize>>()?;
        let (height, width) = match shape.as_slice() {
            [_, height, width, ..] => (*height, *width),
            _ => {
                return Err(Error::InvalidTensorShape(format!(
                    "expected image of shape [B, H, W, C], got {shape:?}"
                )))
            }
        };

        let metadata = SaveMetadata::from_pipe(pipe, a1111_metadata, (width, height));
        let kwargs = metadata.saver_kwargs(py, filename_prefix, path, extension)?;
        kwargs.set_item("images", &image)?;
        kwargs.set_item("prompt", prompt)?;
        kwargs.set_item(
            "extra_pnginfo",
            match extra_pnginfo {
                Some(extra_pnginfo) => extra_pnginfo,
                None => PyDict::new(py).into_any(),
            },
        )?;

        info!("saving {width}x{height} image through '{}'", saver.name());
        let output = saver.call_raw(&kwargs)?;
        let ui = match output.downcast::<PyDict>() {
            Ok(output) => match output.get_item("ui")? {
                Some(ui) => ui,
                None => PyDict::new(py).into_any(),
            },
            Err(_) => PyDict::new(py).into_any(),
        };

        let dict = PyDict::new(py);
        dict.set_item("ui", ui)?;
        dict.set_item("result", (image,))?;
        Ok(dict)
    }

    /// 未保存时提示前端, 不中断工作流
    fn skip<'py>(&self, py: Python<'py>, message: &str) -> Result<Bound<'py, PyDict>, Error> {
        warn!("{message}, nothing saved");
        if let Err(e) = self.send_status(py, message.to_string()) {
            warn!("send status failed, {e}");
        }
        Ok(ui_text(py, message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> Pipe<&'static str> {
        Pipe {
            image: Some("image"),
            positive_text: Some("1girl, smile".to_string()),
            ckpt_name: Some("Illustrious/model.safetensors".to_string()),
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_metadata_from_pipe() -> anyhow::Result<()> {
        let metadata = SaveMetadata::from_pipe(&pipe(), true, (832, 1216));
        assert_eq!(
            metadata,
            SaveMetadata {
                model_name: "Illustrious/model.safetensors".to_string(),
                positive: "1girl, smile".to_string(),
                negative: String::new(),
                seed: 42,
                width: 832,
                height: 1216,
            }
        );

        let empty = SaveMetadata::from_pipe(&Pipe::<&str>::default(), true, (64, 64));
        assert_eq!(empty.model_name, "unknown");
        assert_eq!(empty.seed, 0);
        Ok(())
    }

    #[test]
    fn test_metadata_disabled() -> anyhow::Result<()> {
        let metadata = SaveMetadata::from_pipe(&pipe(), false, (832, 1216));
        assert_eq!(metadata.model_name, "");
        assert_eq!(metadata.positive, "");
        assert_eq!(metadata.seed, 0);
        assert_eq!((metadata.width, metadata.height), (832, 1216));
        Ok(())
    }

    fn kwarg<'py>(kwargs: &Bound<'py, PyDict>, key: &str) -> anyhow::Result<Bound<'py, PyAny>> {
        kwargs
            .get_item(key)?
            .ok_or_else(|| anyhow::anyhow!("missing {key}"))
    }

    #[test]
    #[ignore]
    fn test_saver_kwargs() -> anyhow::Result<()> {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| -> anyhow::Result<()> {
            let metadata = SaveMetadata::from_pipe(&pipe(), true, (832, 1216));
            let kwargs = metadata.saver_kwargs(py, "%time_%seed", "%date", "png")?;
            let get = |key: &str| kwarg(&kwargs, key);
            assert_eq!(kwargs.len(), 27);
            assert_eq!(get("modelname")?.extract::<String>()?, "Illustrious/model.safetensors");
            assert_eq!(get("positive")?.extract::<String>()?, "1girl, smile");
            assert_eq!(get("seed_value")?.extract::<u64>()?, 42);
            assert_eq!(get("width")?.extract::<usize>()?, 832);
            assert_eq!(get("scheduler_name")?.extract::<String>()?, "normal");
            Ok(())
        })
    }
}
