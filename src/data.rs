use std::sync::Arc;

use crate::caption::{self, CaptionError, CaptionReply};
use crate::media::SelectedImage;

pub trait CaptionService: Send + Sync {
    fn caption(&self, image: &SelectedImage) -> Result<CaptionReply, CaptionError>;
}

pub struct HttpCaptionService {
    client: Arc<caption::Client>,
}

impl HttpCaptionService {
    pub fn new(client: Arc<caption::Client>) -> Self {
        Self { client }
    }
}

impl CaptionService for HttpCaptionService {
    fn caption(&self, image: &SelectedImage) -> Result<CaptionReply, CaptionError> {
        tracing::debug!(
            endpoint = %self.client.endpoint(),
            file = %image.file_name,
            bytes = image.len(),
            "posting image for caption"
        );
        self.client.caption(image)
    }
}
