use std::sync::Arc;

use scene_watch_common::event::PictureEvent;

use super::{DispatchError, Handler};
use crate::storage::PictureStore;

/// Persists scene-edge pictures, encoding raw frames on the way.
pub struct PictureDispatcher {
    store: PictureStore,
    jpeg_quality: u8,
}

impl PictureDispatcher {
    pub fn new(store: PictureStore, jpeg_quality: u8) -> Self {
        Self {
            store,
            jpeg_quality,
        }
    }
}

impl Handler for PictureDispatcher {
    type Item = Arc<PictureEvent>;

    fn name(&self) -> &'static str {
        "picture"
    }

    async fn handle(&mut self, picture: Arc<PictureEvent>) -> Result<(), DispatchError> {
        let jpeg = picture.jpeg(self.jpeg_quality)?;
        self.store.put_picture(&picture.identifier(), jpeg).await?;
        Ok(())
    }
}
