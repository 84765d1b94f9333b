use crate::catalog::MediaItem;

/// Ask the catalog task for a fresh scan of the media directory.
#[derive(Debug)]
pub struct RescanRequest;

/// A completed scan; replaces the viewer's catalog wholesale.
#[derive(Debug)]
pub struct CatalogRefreshed(pub Vec<MediaItem>);
