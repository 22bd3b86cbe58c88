//! 端到端会话流程：加载 → 主色 → 取色 → 编辑。

use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use image_analysis::error::AppError;
use image_analysis::palette::{ShortfallPolicy, Swatch};
use image_analysis::service::AnalysisService;
use image_analysis::session::{Outcome, Phase, SwatchTarget};
use image_analysis::settings::AppSettings;

fn encode_png(pixels: RgbaImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
}

fn data_uri(pixels: RgbaImage) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(encode_png(pixels))
    )
}

/// [(255,0,0), (255,0,0), (0,255,0), (0,0,255)]
fn scenario_pixels() -> RgbaImage {
    let mut pixels = RgbaImage::new(2, 2);
    pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    pixels.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
    pixels.put_pixel(0, 1, Rgba([0, 255, 0, 255]));
    pixels.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
    pixels
}

fn service_with_clusters(clusters: usize) -> AnalysisService {
    let mut settings = AppSettings::default();
    settings.palette.clusters = clusters;
    AnalysisService::new(settings).expect("valid settings")
}

#[tokio::test]
async fn scenario_image_palette_and_pick() {
    let service = service_with_clusters(3);

    let outcome = service.load_data_uri(data_uri(scenario_pixels())).await.unwrap();
    assert_eq!(outcome, Outcome::Loaded);

    let view = service.view().unwrap();
    assert_eq!(view.state, Phase::Loaded);
    assert_eq!(view.distinct_colors, Some(3));
    assert_eq!(view.palette.len(), 3);
    assert!(view.palette.contains(&Swatch::from(image::Rgb([255, 0, 0]))));

    let metadata = view.metadata.expect("metadata present");
    assert_eq!(metadata.get("Image Width"), Some(&serde_json::json!(2)));
    assert_eq!(metadata.get("Image Format"), Some(&serde_json::json!("PNG")));

    let outcome = service.pick(1, 1).unwrap();
    assert_eq!(
        outcome,
        Outcome::Picked {
            color: Swatch::from(image::Rgb([0, 0, 255]))
        }
    );
    let view = service.view().unwrap();
    assert_eq!(view.state, Phase::Editing);
    assert_eq!(view.picked[0].hex, "#0000ff");
}

#[tokio::test]
async fn malformed_url_leaves_session_unchanged() {
    let service = service_with_clusters(3);
    service.load_data_uri(data_uri(scenario_pixels())).await.unwrap();
    service.pick(0, 1).unwrap();
    let before = serde_json::to_value(service.view().unwrap()).unwrap();

    let err = service.load_url("ht!tp://::bad").await.unwrap_err();

    assert!(matches!(err, AppError::Image(_)));
    assert_eq!(err.kind(), "LoadError");
    assert_eq!(serde_json::to_value(service.view().unwrap()).unwrap(), before);
}

#[tokio::test]
async fn out_of_bounds_pick_is_rejected() {
    let service = service_with_clusters(3);
    service.load_data_uri(data_uri(scenario_pixels())).await.unwrap();

    let err = service.pick(0, 2).unwrap_err();

    assert_eq!(err.kind(), "CoordinateOutOfBoundsError");
    assert!(service.view().unwrap().picked.is_empty());
}

#[tokio::test]
async fn same_content_reload_preserves_picks_and_new_content_clears_them() {
    let service = service_with_clusters(3);
    let uri = data_uri(scenario_pixels());
    service.load_data_uri(uri.clone()).await.unwrap();
    service.pick(0, 0).unwrap();

    assert_eq!(service.load_data_uri(uri).await.unwrap(), Outcome::Unchanged);
    assert_eq!(service.view().unwrap().picked.len(), 1);

    // 同样的像素，通过上传文件载入
    let path = std::env::temp_dir().join(format!("image-analysis-flow-{}.png", std::process::id()));
    std::fs::write(&path, encode_png(scenario_pixels())).unwrap();
    let outcome = service.load_file(&path).await;
    let _ = std::fs::remove_file(&path);
    assert_eq!(outcome.unwrap(), Outcome::Unchanged);
    assert_eq!(service.view().unwrap().picked.len(), 1);

    let other = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
    assert_eq!(service.load_data_uri(data_uri(other)).await.unwrap(), Outcome::Loaded);
    let view = service.view().unwrap();
    assert!(view.picked.is_empty());
    assert_eq!(view.state, Phase::Loaded);
}

#[tokio::test]
async fn edits_replace_swatches_without_reclustering() {
    let service = service_with_clusters(3);
    service.load_data_uri(data_uri(scenario_pixels())).await.unwrap();

    let outcome = service.edit_swatch(SwatchTarget::Palette, 2, "#ABCDEF").unwrap();
    assert_eq!(outcome, Outcome::SwatchEdited { refresh: true });
    let outcome = service.edit_swatch(SwatchTarget::Palette, 2, "#abcdef").unwrap();
    assert_eq!(outcome, Outcome::SwatchEdited { refresh: false });

    let view = service.view().unwrap();
    assert_eq!(view.palette.len(), 3);
    assert_eq!(view.palette[2].hex, "#abcdef");
    assert_eq!(view.state, Phase::Editing);

    let err = service.edit_swatch(SwatchTarget::Palette, 3, "#000000").unwrap_err();
    assert_eq!(err.code(), "E_SWATCH_OUT_OF_RANGE");
    let err = service.edit_swatch(SwatchTarget::Palette, 0, "#12345").unwrap_err();
    assert_eq!(err.kind(), "ColorParseError");
}

fn two_color_pixels() -> RgbaImage {
    let mut pixels = RgbaImage::from_pixel(2, 2, Rgba([200, 10, 10, 255]));
    pixels.put_pixel(1, 1, Rgba([10, 10, 200, 255]));
    pixels
}

#[tokio::test]
async fn strict_shortfall_policy_reports_insufficient_data() {
    let mut settings = AppSettings::default();
    settings.palette.shortfall = ShortfallPolicy::Strict;
    let service = AnalysisService::new(settings).unwrap();

    let err = service.load_data_uri(data_uri(two_color_pixels())).await.unwrap_err();

    assert_eq!(err.kind(), "InsufficientDataError");
    assert_eq!(service.view().unwrap().state, Phase::Empty);
}

#[tokio::test]
async fn pad_shortfall_policy_repeats_least_represented_color() {
    let service = service_with_clusters(5);

    service.load_data_uri(data_uri(two_color_pixels())).await.unwrap();

    let hexes: Vec<String> = service.view().unwrap().palette.into_iter().map(|s| s.hex).collect();
    assert_eq!(hexes, ["#c80a0a", "#0a0ac8", "#0a0ac8", "#0a0ac8", "#0a0ac8"]);
}

#[tokio::test]
async fn second_url_load_is_served_from_cache() {
    let body = encode_png(scenario_pixels());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // 只应答一次，之后监听器关闭
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();
    });

    let mut settings = AppSettings::default();
    settings.image.allow_private_network = true;
    settings.palette.clusters = 3;
    let service = AnalysisService::new(settings).unwrap();
    let url = format!("http://{}/scenario.png", addr);

    assert_eq!(service.load_url(url.clone()).await.unwrap(), Outcome::Loaded);
    server.join().unwrap();

    service.pick(1, 0).unwrap();
    assert_eq!(service.load_url(url).await.unwrap(), Outcome::Unchanged);

    let view = service.view().unwrap();
    assert_eq!(view.picked.len(), 1);
    let metadata = view.metadata.unwrap();
    assert_eq!(metadata.get("Filename"), Some(&serde_json::json!("scenario.png")));
}
