//! Test doubles shared by the daemon's unit tests.

use async_trait::async_trait;
use facematch_core::{DescriptorExtractor, Embedding, ExtractError};
use facematch_store::{
    DocumentStore, IdentityRecord, ObjectEntry, ObjectMetadata, ObjectStore, StoreError,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;

/// Encode a 1-pixel-high PNG of the given width.
///
/// [`FakeExtractor`] keys its descriptors on image width, so the width is
/// how tests choose which "face" an image contains.
pub fn png(width: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(width, 1, Rgb([90, 120, 150]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test png");
    bytes
}

/// Extractor returning a fixed descriptor per image width; unknown widths have no face.
#[derive(Default)]
pub struct FakeExtractor {
    faces: HashMap<u32, Vec<f32>>,
    panics_on: Option<u32>,
}

impl FakeExtractor {
    pub fn new(faces: impl IntoIterator<Item = (u32, Vec<f32>)>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            panics_on: None,
        }
    }

    /// Panic instead of extracting when the image has this width.
    pub fn panicking_on(mut self, width: u32) -> Self {
        self.panics_on = Some(width);
        self
    }
}

impl DescriptorExtractor for FakeExtractor {
    fn extract(&mut self, image: &DynamicImage) -> Result<Option<Embedding>, ExtractError> {
        if self.panics_on == Some(image.width()) {
            panic!("model crashed on width {}", image.width());
        }
        Ok(self.faces.get(&image.width()).cloned().map(Embedding::new))
    }
}

/// One object in a [`MemoryObjectStore`]. `data: None` makes the download fail.
pub struct MemoryObject {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl MemoryObject {
    pub fn image(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content_type: Some("image/png".to_string()),
            data: Some(data),
        }
    }

    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    pub fn broken(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: None,
        }
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Vec<MemoryObject>,
    pub fail_list: bool,
}

impl MemoryObjectStore {
    pub fn new(objects: Vec<MemoryObject>) -> Self {
        Self {
            objects,
            fail_list: false,
        }
    }

    fn find(&self, name: &str) -> Result<&MemoryObject, StoreError> {
        self.objects
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError> {
        if self.fail_list {
            return Err(StoreError::RootNotFound("memory".to_string()));
        }
        Ok(self
            .objects
            .iter()
            .filter(|o| o.name.starts_with(prefix))
            .map(|o| ObjectEntry {
                name: o.name.clone(),
            })
            .collect())
    }

    async fn metadata(&self, name: &str) -> Result<ObjectMetadata, StoreError> {
        let object = self.find(name)?;
        Ok(ObjectMetadata {
            content_type: object.content_type.clone(),
            size: object.data.as_ref().map_or(0, |d| d.len() as u64),
        })
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.find(name)?
            .data
            .clone()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("simulated download failure")))
    }
}

/// Document store that always fails, for the unexpected-error path.
pub struct FailingDocumentStore;

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn get(&self, _key: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("document store unavailable")))
    }
}

pub fn record(label: &str) -> IdentityRecord {
    IdentityRecord {
        label: label.to_string(),
        fecha_nacimiento: "1990-04-12".to_string(),
        tlf_emergencia: "+58 412 5550101".to_string(),
        cedula: "V-12345678".to_string(),
        img_url: format!("https://example.org/{label}.jpg"),
    }
}
