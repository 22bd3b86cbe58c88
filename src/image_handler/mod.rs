//! # 图片加载模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“图片来源识别 → 加载校验 → 解码 → 元数据提取”按职责拆分为多个子模块，
//! 避免单文件膨胀与耦合。
//!
//! - `handler`：编排整条加载流水线，持有来源缓存
//! - `loader`：负责上传/URL/Base64 加载与安全校验
//! - `pipeline`：负责解码、像素限制、帧数统计
//! - `metadata`：负责结构字段与 EXIF 标签提取
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! service.rs（会话服务）
//!    ↓
//! handler.rs（缓存查询 + 阶段耗时日志）
//!    ├─ loader.rs（来源加载 + URL/体积安全校验）
//!    └─ pipeline.rs（解码 + 像素限制 + 帧数）
//!    ↓
//! Arc<RasterImage> ──→ metadata.rs / palette
//! ```

mod config;
mod error;
mod handler;
mod loader;
mod metadata;
mod pipeline;
mod source;

pub use config::ImageConfig;
pub use error::ImageError;
pub use handler::ImageHandler;
pub use metadata::{ImageMetadata, UNREADABLE_TAG, extract_metadata};
pub use source::{ImageSource, RasterImage};

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::{Cursor, Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    pub(crate) fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    pub(crate) fn create_gif_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([12, 34, 56, 255]));

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Gif)
            .expect("failed to encode test gif");
        cursor.into_inner()
    }

    /// 只接受一个连接并读取请求；可选地先写出响应头，然后停顿 `stall` 不再发送任何数据。
    pub(crate) fn spawn_stalling_stub(head: Option<String>, stall: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            if let Some(head) = head {
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.flush();
            }
            thread::sleep(stall);
        });

        addr
    }

    /// 本地 HTTP 桩：按顺序为每个连接返回一条（状态行, Content-Type, 响应体）。
    pub(crate) fn spawn_http_stub(
        responses: Vec<(String, String, Vec<u8>)>,
    ) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            for (status, content_type, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept failed");

                let mut req_buf = [0u8; 1024];
                let _ = stream.read(&mut req_buf);

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content_type,
                    body.len()
                );

                stream.write_all(head.as_bytes()).expect("write headers failed");
                stream.write_all(&body).expect("write body failed");
                stream.flush().expect("flush failed");
            }
        });

        (addr, server)
    }
}
