use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::io::Cursor;
use wecare_assistant::config::{RemoteConfig, Secret};

pub const TEST_TOKEN: &str = "hf_test_token_123";

/// A small synthetic "scan" with a bright region in the middle
pub fn create_test_image() -> RgbImage {
    RgbImage::from_fn(32, 24, |x, y| {
        if (8..24).contains(&x) && (6..18).contains(&y) {
            Rgb([230, 230, 230])
        } else {
            Rgb([20, 20, 20])
        }
    })
}

/// Encode an image the way an uploading client would
pub fn create_upload(format: ImageFormat) -> String {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(create_test_image())
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    STANDARD.encode(bytes)
}

pub fn create_remote_config(endpoint: String) -> RemoteConfig {
    RemoteConfig {
        endpoint,
        token: Some(Secret::new(TEST_TOKEN)),
        timeout_secs: 60,
        ..RemoteConfig::default()
    }
}

pub fn conversation_response(answer: &str) -> Value {
    json!([{
        "generated_text": [
            {"role": "system", "content": [{"type": "text", "text": "You are an expert radiologist."}]},
            {"role": "user", "content": [{"type": "text", "text": "Describe this image"}, {"type": "image"}]},
            {"role": "assistant", "content": answer}
        ]
    }])
}
