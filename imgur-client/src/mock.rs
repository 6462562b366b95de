//! Scripted in-process [`GalleryApi`] for tests.

use crate::api::{ApiReply, Download, GalleryApi};
use async_trait::async_trait;
use reposter_core::{
    Comment, CoreError, Credits, GalleryApiError, GalleryItem, GalleryQuery, ImageRef, Section,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Credits,
    Gallery(Section, u32),
    AlbumImages(String),
    Comments(String),
    PostComment(String, String),
    Download(String),
}

#[derive(Debug)]
struct MockState {
    pages: HashMap<(Section, u32), Vec<GalleryItem>>,
    albums: HashMap<String, Vec<ImageRef>>,
    comments: HashMap<String, Vec<Comment>>,
    downloads: HashMap<String, Download>,
    credits: VecDeque<Credits>,
    default_credits: Credits,
    reply_credits: Option<Credits>,
    failures: HashMap<String, VecDeque<CoreError>>,
    calls: Vec<MockCall>,
    posted: Vec<(String, String)>,
}

/// Cloning shares the script, so a test can keep a handle for inspection
/// after moving the mock into a client.
#[derive(Debug, Clone)]
pub struct MockGalleryApi {
    state: Arc<Mutex<MockState>>,
}

impl MockGalleryApi {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                pages: HashMap::new(),
                albums: HashMap::new(),
                comments: HashMap::new(),
                downloads: HashMap::new(),
                credits: VecDeque::new(),
                default_credits: Credits::new(1000, 10000),
                reply_credits: None,
                failures: HashMap::new(),
                calls: Vec::new(),
                posted: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_page(&self, section: Section, page: u32, items: Vec<GalleryItem>) {
        self.state().pages.insert((section, page), items);
    }

    pub fn add_album(&self, album_id: &str, images: Vec<ImageRef>) {
        self.state().albums.insert(album_id.to_string(), images);
    }

    pub fn add_comments(&self, post_id: &str, comments: Vec<Comment>) {
        self.state().comments.insert(post_id.to_string(), comments);
    }

    pub fn add_download(&self, url: &str, bytes: Vec<u8>) {
        self.add_download_status(url, 200, bytes);
    }

    pub fn add_download_status(&self, url: &str, status: u16, bytes: Vec<u8>) {
        self.state()
            .downloads
            .insert(url.to_string(), Download { status, bytes });
    }

    /// Queued counters are handed out once each, then the default repeats.
    pub fn queue_credits(&self, credits: Credits) {
        self.state().credits.push_back(credits);
    }

    pub fn set_default_credits(&self, credits: Credits) {
        self.state().default_credits = credits;
    }

    /// Credits reported alongside every successful reply.
    pub fn set_reply_credits(&self, credits: Credits) {
        self.state().reply_credits = Some(credits);
    }

    /// Endpoints: `credits`, `gallery`, `album_images`, `comments`,
    /// `post_comment`, `download`.
    pub fn fail_next(&self, endpoint: &str, error: GalleryApiError) {
        self.fail_next_with(endpoint, CoreError::GalleryApi(error));
    }

    pub fn fail_next_with(&self, endpoint: &str, error: CoreError) {
        self.state()
            .failures
            .entry(endpoint.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn posted_comments(&self) -> Vec<(String, String)> {
        self.state().posted.clone()
    }

    fn begin(&self, endpoint: &str, call: MockCall) -> Result<Option<Credits>, CoreError> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(error) = state
            .failures
            .get_mut(endpoint)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        Ok(state.reply_credits)
    }
}

impl Default for MockGalleryApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GalleryApi for MockGalleryApi {
    async fn list_gallery(
        &self,
        query: &GalleryQuery,
    ) -> Result<ApiReply<Vec<GalleryItem>>, CoreError> {
        let credits = self.begin("gallery", MockCall::Gallery(query.section, query.page))?;
        let items = self
            .state()
            .pages
            .get(&(query.section, query.page))
            .cloned()
            .unwrap_or_default();
        Ok(ApiReply::new(items, credits))
    }

    async fn list_album_images(
        &self,
        album_id: &str,
    ) -> Result<ApiReply<Vec<ImageRef>>, CoreError> {
        let credits = self.begin("album_images", MockCall::AlbumImages(album_id.to_string()))?;
        let images = self.state().albums.get(album_id).cloned().ok_or_else(|| {
            CoreError::GalleryApi(GalleryApiError::NotFound {
                resource: format!("album/{}/images", album_id),
            })
        })?;
        Ok(ApiReply::new(images, credits))
    }

    async fn list_comments(&self, post_id: &str) -> Result<ApiReply<Vec<Comment>>, CoreError> {
        let credits = self.begin("comments", MockCall::Comments(post_id.to_string()))?;
        let comments = self
            .state()
            .comments
            .get(post_id)
            .cloned()
            .unwrap_or_default();
        Ok(ApiReply::new(comments, credits))
    }

    async fn post_comment(&self, post_id: &str, text: &str) -> Result<ApiReply<()>, CoreError> {
        let credits = self.begin(
            "post_comment",
            MockCall::PostComment(post_id.to_string(), text.to_string()),
        )?;
        self.state()
            .posted
            .push((post_id.to_string(), text.to_string()));
        Ok(ApiReply::new((), credits))
    }

    async fn get_credits(&self) -> Result<Credits, CoreError> {
        self.begin("credits", MockCall::Credits)?;
        let mut state = self.state();
        let credits = state.credits.pop_front().unwrap_or(state.default_credits);
        Ok(credits)
    }

    async fn download(&self, url: &str) -> Result<Download, CoreError> {
        self.begin("download", MockCall::Download(url.to_string()))?;
        let download = self.state().downloads.get(url).cloned().unwrap_or(Download {
            status: 404,
            bytes: Vec::new(),
        });
        Ok(download)
    }
}
