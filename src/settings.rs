//! 应用设置
//!
//! 启动时从可选的 JSON 文件读取，缺失的字段使用默认值，读取后统一校验。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::image_handler::ImageConfig;
use crate::palette::PaletteOptions;

/// 允许的最大聚类数。
pub const MAX_CLUSTERS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub image: ImageConfig,
    pub palette: PaletteOptions,
}

impl AppSettings {
    /// 从 JSON 文件读取并校验设置。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_analysis::settings::AppSettings;
    ///
    /// let settings = AppSettings::load_from_path("analysis.json".as_ref())?;
    /// # Ok::<(), image_analysis::error::AppError>(())
    /// ```
    pub fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("读取设置文件失败 {}: {}", path.display(), e)))?;
        let settings = Self::from_json(&content)?;
        log::info!("⚙️ 已加载设置文件: {}", path.display());
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let settings: Self = serde_json::from_str(content)
            .map_err(|e| AppError::Config(format!("解析设置文件失败: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.image
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let palette = &self.palette;
        if palette.clusters == 0 || palette.clusters > MAX_CLUSTERS {
            return Err(AppError::Config(format!(
                "clusters 必须在 1..={} 之间，当前为 {}",
                MAX_CLUSTERS, palette.clusters
            )));
        }
        if palette.max_iter == 0 {
            return Err(AppError::Config("max_iter 必须大于 0".to_string()));
        }
        if palette.n_init == 0 {
            return Err(AppError::Config("n_init 必须大于 0".to_string()));
        }
        if !palette.tolerance.is_finite() || palette.tolerance < 0.0 {
            return Err(AppError::Config(format!(
                "tolerance 必须是非负有限数，当前为 {}",
                palette.tolerance
            )));
        }
        Ok(())
    }
}
