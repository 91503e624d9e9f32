pub mod audio;
pub mod background;
pub mod card;
pub mod decoding;
pub mod emphasis;
pub mod encoding;
pub mod font_assets;
pub mod format;
pub mod layout;
pub mod manifest;
pub mod media;
pub mod phrase;
pub mod renderer;
pub mod retry;
pub mod reveal;
pub mod schema;
pub mod style;
pub mod synthesis;
pub mod timeline;
pub mod timing;
