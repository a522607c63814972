//! Native clipboard through arboard
//!
//! arboard handles are not shareable across threads on every platform, so a
//! single worker thread owns the handle and serves requests in order. This
//! also serializes all writes to the OS clipboard.

use async_trait::async_trait;
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ClipboardData, ClipboardEntry, ClipboardError, ClipboardProvider, Metadata};

type Reply<T> = oneshot::Sender<Result<T, ClipboardError>>;

enum Request {
    Read(Reply<Option<ClipboardEntry>>),
    Write(ClipboardEntry, Reply<()>),
}

/// System clipboard provider
pub struct SystemClipboard {
    requests: mpsc::Sender<Request>,
}

impl SystemClipboard {
    /// Start the clipboard worker thread
    pub fn new() -> Self {
        let (requests, receiver) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("clipboard".to_string())
            .spawn(move || serve(receiver));
        if let Err(e) = spawned {
            // Requests fail with Unavailable once the receiver is gone.
            warn!("Failed to start clipboard thread: {}", e);
        }

        Self { requests }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, ClipboardError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .map_err(|_| ClipboardError::Unavailable("clipboard thread is not running".into()))?;
        response
            .await
            .map_err(|_| ClipboardError::Unavailable("clipboard thread stopped".into()))?
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClipboardProvider for SystemClipboard {
    async fn read(&self) -> Result<Option<ClipboardEntry>, ClipboardError> {
        self.call(Request::Read).await
    }

    async fn write(&self, entry: &ClipboardEntry) -> Result<(), ClipboardError> {
        let entry = entry.clone();
        self.call(move |reply| Request::Write(entry, reply)).await
    }

    fn name(&self) -> &str {
        "system"
    }
}

fn serve(receiver: mpsc::Receiver<Request>) {
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(clipboard) => {
            debug!("Opened system clipboard");
            Ok(clipboard)
        }
        Err(e) => {
            warn!("System clipboard unavailable: {}", e);
            Err(e.to_string())
        }
    };

    while let Ok(request) = receiver.recv() {
        match request {
            Request::Read(reply) => {
                let result = match clipboard.as_mut() {
                    Ok(clipboard) => read_entry(clipboard),
                    Err(reason) => Err(ClipboardError::Unavailable(reason.clone())),
                };
                let _ = reply.send(result);
            }
            Request::Write(entry, reply) => {
                let result = match clipboard.as_mut() {
                    Ok(clipboard) => write_entry(clipboard, &entry),
                    Err(reason) => Err(ClipboardError::Unavailable(reason.clone())),
                };
                let _ = reply.send(result);
            }
        }
    }

    debug!("Clipboard thread exiting");
}

fn read_entry(clipboard: &mut arboard::Clipboard) -> Result<Option<ClipboardEntry>, ClipboardError> {
    match clipboard.get_image() {
        Ok(image) => {
            let (bytes, metadata) = encode_png(image.width, image.height, &image.bytes)?;
            return Ok(Some(ClipboardEntry::image(bytes, metadata)));
        }
        Err(arboard::Error::ContentNotAvailable) => {}
        Err(e) => return Err(map_error(e)),
    }

    match clipboard.get_text() {
        Ok(text) if text.is_empty() => Ok(None),
        Ok(text) => Ok(Some(ClipboardEntry::text(text))),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(e) => Err(map_error(e)),
    }
}

fn write_entry(clipboard: &mut arboard::Clipboard, entry: &ClipboardEntry) -> Result<(), ClipboardError> {
    match &entry.data {
        ClipboardData::Text(text) => clipboard.set_text(text.as_str()).map_err(map_error),
        ClipboardData::Image(bytes) => {
            let (width, height, pixels) = decode_rgba(bytes, entry.image_format())?;
            clipboard
                .set_image(arboard::ImageData {
                    width,
                    height,
                    bytes: Cow::Owned(pixels),
                })
                .map_err(map_error)
        }
    }
}

fn map_error(error: arboard::Error) -> ClipboardError {
    match error {
        arboard::Error::ClipboardNotSupported => {
            ClipboardError::Unavailable("clipboard not supported on this system".into())
        }
        arboard::Error::ConversionFailure => {
            ClipboardError::UnsupportedType("clipboard content could not be converted".into())
        }
        arboard::Error::Unknown { description } => ClipboardError::Platform(description),
        other => ClipboardError::Platform(other.to_string()),
    }
}

/// Encode raw RGBA pixels as PNG with the metadata peers expect
pub fn encode_png(
    width: usize,
    height: usize,
    rgba: &[u8],
) -> Result<(Vec<u8>, Metadata), ClipboardError> {
    let buffer = image::RgbaImage::from_raw(width as u32, height as u32, rgba.to_vec())
        .ok_or_else(|| ClipboardError::Image("pixel buffer does not match dimensions".into()))?;

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ClipboardError::Image(e.to_string()))?;

    let mut metadata = Metadata::new();
    metadata.insert("format".into(), "PNG".into());
    metadata.insert("size".into(), serde_json::json!([width, height]));
    metadata.insert("mode".into(), "RGBA".into());

    Ok((bytes, metadata))
}

/// Decode image bytes into RGBA pixels, trusting `format` when it is known
pub fn decode_rgba(bytes: &[u8], format: &str) -> Result<(usize, usize, Vec<u8>), ClipboardError> {
    let decoded = match image::ImageFormat::from_extension(format.to_ascii_lowercase()) {
        Some(format) => image::load_from_memory_with_format(bytes, format)
            .or_else(|_| image::load_from_memory(bytes)),
        None => image::load_from_memory(bytes),
    }
    .map_err(|e| ClipboardError::Image(e.to_string()))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((width as usize, height as usize, rgba.into_raw()))
}
