use crate::{
    config::Config,
    errors::{AppError, AppResult},
    ops::{
        registry::{Args, OperationHandler},
        types::{OperationKind, Outcome, PathParam},
    },
    sandbox::{PathGuard, PathIntent, ValidatedPath},
};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;

const PATH_PARAMS: &[PathParam] = &[PathParam { name: "file_path", intent: PathIntent::Existing }];

pub struct ImageResizer {
    max_dimension: u32,
}

impl ImageResizer {
    pub fn new(cfg: &Config) -> Self { Self { max_dimension: cfg.limits.max_image_dimension } }

    fn dimension(&self, args: &Args, name: &str) -> AppResult<u32> {
        let raw = args.param(name)?;
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidArgument(format!("{name} must be an integer")))?;
        if value <= 0 {
            return Err(AppError::InvalidDimensions(format!("{name} must be positive, got {value}")));
        }
        if value > i64::from(self.max_dimension) {
            return Err(AppError::InvalidDimensions(format!("{name} exceeds {}", self.max_dimension)));
        }
        Ok(value as u32)
    }
}

/// `photo.png` → `photo_resized.png`; no extension → `photo_resized`.
fn resized_name(source: &ValidatedPath) -> String {
    let stem = source.file_stem().unwrap_or("image");
    match source.extension() {
        Some(ext) => format!("{stem}_resized.{ext}"),
        None => format!("{stem}_resized"),
    }
}

fn decode_error(e: ImageError) -> AppError {
    match e {
        ImageError::IoError(io) => AppError::from_read(io),
        other => AppError::UnsupportedFormat(other.to_string()),
    }
}

fn encode_error(e: ImageError) -> AppError {
    match e {
        ImageError::IoError(io) => AppError::WriteFailed(io.to_string()),
        other => AppError::UnsupportedFormat(other.to_string()),
    }
}

fn resize_file(source: &ValidatedPath, target: &ValidatedPath, width: u32, height: u32) -> AppResult<()> {
    let reader = ImageReader::open(source.as_path())
        .map_err(AppError::from_read)?
        .with_guessed_format()
        .map_err(AppError::from_read)?;
    let format: ImageFormat = reader
        .format()
        .ok_or_else(|| AppError::UnsupportedFormat("not a recognised image".into()))?;
    let img = reader.decode().map_err(decode_error)?;
    // stretch to the exact box, aspect ratio is the caller's business
    let resized = img.resize_exact(width, height, FilterType::Triangle);
    let bytes = encode(&resized, format)?;
    std::fs::write(target.as_path(), bytes).map_err(|e| AppError::WriteFailed(e.to_string()))
}

/// Encodes in memory so a failed encode never leaves a partial file behind.
fn encode(img: &DynamicImage, format: ImageFormat) -> AppResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).map_err(encode_error)?;
    Ok(buf.into_inner())
}

#[async_trait]
impl OperationHandler for ImageResizer {
    fn kind(&self) -> OperationKind { OperationKind::ResizeImage }
    fn path_params(&self) -> &'static [PathParam] { PATH_PARAMS }
    fn params(&self) -> &'static [&'static str] { &["width", "height"] }

    async fn execute(&self, guard: &PathGuard, args: Args) -> AppResult<Outcome> {
        let source = args.path("file_path")?.clone();
        let width = self.dimension(&args, "width")?;
        let height = self.dimension(&args, "height")?;
        let target = guard.validate_derived(source.with_file_name(&resized_name(&source)))?;

        let out = target.clone();
        tokio::task::spawn_blocking(move || resize_file(&source, &out, width, height))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        tracing::debug!(output = %target, width, height, "image resized");
        Ok(Outcome::Written { message: "Image resized successfully", field: "resized_path", path: target })
    }
}
