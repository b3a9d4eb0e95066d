//! 模型系列推断
//!
//! AlignYourStepsScheduler 需要模型系列名称

use log::warn;
use pyo3::{types::PyAnyMethods, Bound, PyAny};
use strum_macros::{Display, EnumString};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ModelFamily {
    #[strum(to_string = "SDXL")]
    Sdxl,
    #[strum(to_string = "SD1")]
    Sd1,
    #[strum(to_string = "SVD")]
    Svd,
}

impl ModelFamily {
    /// 由潜空间通道数推断
    ///
    /// 16 -> SDXL, 4 -> SD1 (带时间维度标记为 SVD), 其余 -> SDXL
    pub fn infer(latent_channels: Option<usize>, temporal: bool) -> Self {
        match latent_channels {
            Some(4) if temporal => ModelFamily::Svd,
            Some(4) => ModelFamily::Sd1,
            _ => ModelFamily::Sdxl,
        }
    }

    /// 探测 ModelPatcher, 失败时回退为 SDXL
    pub fn probe(model: &Bound<'_, PyAny>) -> Self {
        match Self::try_probe(model) {
            Ok(family) => family,
            Err(e) => {
                warn!("model family detection failed, fallback to SDXL, {e}");
                ModelFamily::Sdxl
            }
        }
    }

    fn try_probe(model: &Bound<'_, PyAny>) -> Result<Self, Error> {
        let inner = model.getattr("model")?;
        if !inner.hasattr("latent_format")? {
            return Ok(Self::infer(None, false));
        }

        let channels = inner
            .getattr("latent_format")?
            .getattr("latent_channels")?
            .extract::<usize>()?;
        let temporal = inner.hasattr("is_temporal")?
            || inner.get_type().to_string().to_lowercase().contains("svd");

        Ok(Self::infer(Some(channels), temporal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() -> anyhow::Result<()> {
        assert_eq!(ModelFamily::infer(Some(16), false), ModelFamily::Sdxl);
        assert_eq!(ModelFamily::infer(Some(4), false), ModelFamily::Sd1);
        assert_eq!(ModelFamily::infer(Some(4), true), ModelFamily::Svd);
        assert_eq!(ModelFamily::infer(Some(128), false), ModelFamily::Sdxl);
        assert_eq!(ModelFamily::infer(None, true), ModelFamily::Sdxl);
        Ok(())
    }

    #[test]
    fn test_display() -> anyhow::Result<()> {
        assert_eq!(ModelFamily::Sd1.to_string(), "SD1");
        assert_eq!("SVD".parse::<ModelFamily>()?, ModelFamily::Svd);
        Ok(())
    }
}
