//! # 分析服务
//!
//! ## 设计思路
//!
//! `AnalysisService` 是前端唯一的入口：持有图片加载器、聚类参数和一个会话。
//! 所有命令串行执行，每条命令要么完整生效，要么完全不生效。
//!
//! ## 实现思路
//!
//! - 会话放在 `Mutex` 中，命令在锁内完成“计算新会话 → 替换”。
//! - 网络加载是唯一的慢操作：先在锁外拿到 `RasterImage`，再加锁应用
//!   `LoadImage`，因此下载期间其它命令不会被阻塞。
//! - 颜色字符串在进入状态机前解析，解析失败直接返回 `ColorParse`。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::AppError;
use crate::image_handler::{ImageHandler, ImageSource};
use crate::palette::{PaletteOptions, hex_to_rgb};
use crate::session::{Coordinate, Outcome, Session, SessionCommand, SessionError, SessionView, SwatchTarget};
use crate::settings::AppSettings;

pub struct AnalysisService {
    handler: ImageHandler,
    palette_options: PaletteOptions,
    session: Mutex<Session>,
}

impl AnalysisService {
    /// 使用校验后的设置创建服务。
    ///
    /// # 示例
    /// ```rust
    /// use image_analysis::service::AnalysisService;
    /// use image_analysis::settings::AppSettings;
    ///
    /// let service = AnalysisService::new(AppSettings::default())?;
    /// assert_eq!(service.view()?.state.as_str(), "empty");
    /// # Ok::<(), image_analysis::error::AppError>(())
    /// ```
    pub fn new(settings: AppSettings) -> Result<Self, AppError> {
        settings.validate()?;
        Ok(Self {
            handler: ImageHandler::new(settings.image),
            palette_options: settings.palette,
            session: Mutex::new(Session::new()),
        })
    }

    /// 从任意来源载入图片并更新会话。
    pub async fn load(&self, source: ImageSource) -> Result<Outcome, AppError> {
        let raster = self.handler.load(source).await?;
        self.apply(SessionCommand::LoadImage {
            raster,
            options: self.palette_options.clone(),
        })
    }

    pub async fn load_url(&self, url: impl Into<String>) -> Result<Outcome, AppError> {
        self.load(ImageSource::Url(url.into())).await
    }

    pub async fn load_data_uri(&self, data: impl Into<String>) -> Result<Outcome, AppError> {
        self.load(ImageSource::Base64(data.into())).await
    }

    /// 读取本地文件，按上传处理。
    pub async fn load_file(&self, path: &Path) -> Result<Outcome, AppError> {
        let source = ImageHandler::read_upload_file(path, self.handler.config())?;
        self.load(source).await
    }

    pub fn pick(&self, x: u32, y: u32) -> Result<Outcome, AppError> {
        self.apply(SessionCommand::PickPixel(Coordinate::new(x, y)))
    }

    pub fn edit_swatch(&self, target: SwatchTarget, index: usize, hex: &str) -> Result<Outcome, AppError> {
        let color = hex_to_rgb(hex)?;
        self.apply(SessionCommand::EditSwatch { target, index, color })
    }

    pub fn reset(&self) -> Result<Outcome, AppError> {
        self.apply(SessionCommand::Reset)
    }

    pub fn view(&self) -> Result<SessionView, AppError> {
        Ok(self.lock_session()?.view())
    }

    fn apply(&self, command: SessionCommand) -> Result<Outcome, AppError> {
        let mut guard = self.lock_session()?;
        let transition = guard.apply(command)?;
        *guard = transition.session;
        Ok(transition.outcome)
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, Session>, AppError> {
        self.session
            .lock()
            .map_err(|_| AppError::Session(SessionError::Unavailable("会话锁已中毒".to_string())))
    }
}
