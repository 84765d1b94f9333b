pub mod catalog;
pub mod config;
pub mod events;
pub mod playback;
pub mod video;

pub mod processing {
    pub mod layout;
}

pub mod render {
    pub mod loader;
    pub mod viewer;
}

pub mod tasks {
    pub mod catalog;
}
