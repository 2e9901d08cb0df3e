use async_trait::async_trait;
use common::plates::ImageInput;
use plate_engine::RecognitionService;

/// Anything that can turn a captured frame into a plate string
#[async_trait]
pub trait PlateSource: Send + Sync {
    /// `None` when no plate could be read
    async fn read_plate(&self, image: ImageInput) -> Option<String>;
}

#[async_trait]
impl PlateSource for RecognitionService {
    async fn read_plate(&self, image: ImageInput) -> Option<String> {
        self.detect_plate(image).await
    }
}

/// Plate source that always reports the same plate. Handy for wiring tests
/// and for gates fed by an external reader.
#[derive(Debug, Clone, Default)]
pub struct FixedPlateSource {
    plate: Option<String>,
}

impl FixedPlateSource {
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: Some(plate.into()),
        }
    }

    pub fn illegible() -> Self {
        Self { plate: None }
    }
}

#[async_trait]
impl PlateSource for FixedPlateSource {
    async fn read_plate(&self, _image: ImageInput) -> Option<String> {
        self.plate.clone()
    }
}
