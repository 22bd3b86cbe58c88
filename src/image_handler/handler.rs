//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageHandler` 只负责流程编排与来源缓存，不关心会话状态。
//! 处理链路固定为：
//! 1. 查询来源缓存（URL / Base64）
//! 2. 按来源加载原始字节
//! 3. 解码为 `RasterImage` 并写入缓存
//!
//! ## 实现思路
//!
//! - 配置在启动时确定并校验，运行期间只读。
//! - 来源缓存是显式的 `来源键 → Arc<RasterImage>` 映射，进程生命周期内不失效：
//!   同一来源被视为不可变，重复请求不会再次下载。
//! - 记录 `load/decode/total` 阶段耗时，便于性能诊断。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{ImageConfig, ImageError, ImageSource, RasterImage};

/// 图片加载器。
pub struct ImageHandler {
    config: ImageConfig,
    raster_cache: Arc<Mutex<HashMap<String, Arc<RasterImage>>>>,
}

impl ImageHandler {
    /// 根据启动时确定的配置创建加载器。
    ///
    /// # 示例
    /// ```rust
    /// use image_analysis::image_handler::{ImageConfig, ImageHandler};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default());
    /// assert_eq!(handler.cached_source_count(), 0);
    /// ```
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config,
            raster_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// 处理主入口：从任意来源加载并解码图片。
    ///
    /// 失败不会写入缓存，也不会产生其它副作用。
    pub async fn load(&self, source: ImageSource) -> Result<Arc<RasterImage>, ImageError> {
        let cache_key = source.cache_key();

        if let Some(key) = cache_key.as_deref() {
            if let Some(cached) = self.get_cached(key) {
                log::debug!("♻️ 命中来源缓存 - 类型: {}", source.kind());
                return Ok(cached);
            }
        }

        let config = &self.config;
        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = self.load_raw(&source, config).await?;
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let raster = Arc::new(self.decode_raster(raw, config)?);
        let decode_elapsed = decode_start.elapsed();

        if let Some(key) = cache_key {
            self.store_cached(key, Arc::clone(&raster));
        }

        log::info!(
            "✅ 图片加载完成 - 类型: {} load={}ms decode={}ms total={}ms",
            source.kind(),
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(raster)
    }

    /// 当前缓存的来源数量。
    pub fn cached_source_count(&self) -> usize {
        self.raster_cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn get_cached(&self, key: &str) -> Option<Arc<RasterImage>> {
        let cache = match self.raster_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        cache.get(key).cloned()
    }

    fn store_cached(&self, key: String, raster: Arc<RasterImage>) {
        let mut cache = match self.raster_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        cache.entry(key).or_insert(raster);
    }
}
