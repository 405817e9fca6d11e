//! Voice profile and synthesis service client
//!
//! Talks to the two backend endpoints: voice sample upload and callout generation.

mod client;

pub use client::{
    CalloutService, GenerateRequest, ServiceError, GENERATE_CALLOUT_PATH, UPLOAD_FIELD_NAME,
    UPLOAD_FILE_NAME, UPLOAD_VOICE_PATH,
};
