//! 多段文本条件
//!
//! 每段文本单独经 CLIP 编码, 再沿 token 维度拼接为一个条件

use log::debug;
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyList, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_CONDITIONING,
    error::Error,
    text::prompt_text::PromptSegments,
    wrapper::comfyui::{
        types::{NODE_CLIP, NODE_CONDITIONING, NODE_STRING},
        PromptServer,
    },
};

/// 文本输入, 按此顺序编码与拼接
pub const TEXT_INPUTS: [&str; 5] = ["quality", "style", "trigger", "character", "prompt"];

/// clip.tokenize + clip.encode_from_tokens, 返回 (cond, pooled)
fn encode_text<'py>(
    clip: &Bound<'py, PyAny>,
    text: &str,
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    let py = clip.py();
    let tokens = clip.call_method1("tokenize", (text,))?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("return_pooled", true)?;
    let output = clip.call_method("encode_from_tokens", (tokens,), Some(&kwargs))?;
    Ok(output.extract()?)
}

/// 编码所有文本段并拼接, 没有可编码文本时编码空字符串
///
/// pooled_output 取第一段
pub fn encode_segments<'py>(
    clip: &Bound<'py, PyAny>,
    segments: &[String],
) -> Result<Bound<'py, PyAny>, Error> {
    let py = clip.py();

    let (cond, pooled) = match segments.split_first() {
        None => encode_text(clip, "")?,
        Some((first, rest)) => {
            let (first_cond, pooled) = encode_text(clip, first)?;
            let mut conds = vec![first_cond];
            for text in rest {
                conds.push(encode_text(clip, text)?.0);
            }
            debug!("concatenating {} conditionings", conds.len());

            let cond = if conds.len() == 1 {
                conds.remove(0)
            } else {
                py.import("torch")?
                    .call_method1("cat", (PyList::new(py, conds)?, 1))?
            };
            (cond, pooled)
        }
    };

    let extra = PyDict::new(py);
    extra.set_item("pooled_output", pooled)?;
    let entry = PyList::new(py, [cond, extra.into_any()])?;
    Ok(PyList::new(py, [entry])?.into_any())
}

/// 多段文本条件
#[pyclass(subclass)]
pub struct MultiStringConditioning {}

impl PromptServer for MultiStringConditioning {}

#[pymethods]
impl MultiStringConditioning {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_CONDITIONING, NODE_STRING, NODE_STRING)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("conditioning", "combined_text", "lora_syntax")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_CONDITIONING;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Strip comments and <lora:...> tags, encode each non-empty string separately and concatenate the conditionings."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("clip", (NODE_CLIP,))?;
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                for name in TEXT_INPUTS {
                    let options = PyDict::new(py);
                    options.set_item("forceInput", true)?;
                    optional.set_item(name, (NODE_STRING, options))?;
                }
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (clip, quality=None, style=None, trigger=None, character=None, prompt=None)
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        clip: Bound<'py, PyAny>,
        quality: Option<String>,
        style: Option<String>,
        trigger: Option<String>,
        character: Option<String>,
        prompt: Option<String>,
    ) -> PyResult<(Bound<'py, PyAny>, String, String)> {
        let inputs = [quality, style, trigger, character, prompt];
        let segments = PromptSegments::parse(inputs.iter().map(|t| t.as_deref().unwrap_or_default()));

        let conditioning = encode_segments(&clip, &segments.segments)
            .map_err(|e| self.raise_error(py, "MultiStringConditioning", e))?;
        Ok((conditioning, segments.combined_text(), segments.lora_syntax))
    }
}
