// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! The always-on recorder: capture loop, OCR/embedding pipeline,
//! archiver, tier-transparent storage access, search and the activity
//! timeline with its AI narrative.

pub mod activity;
pub mod ai;
pub mod archiver;
pub mod daemon;
pub mod logging;
pub mod pipeline;
pub mod search;
pub mod storage;
pub mod summary;
