use std::borrow::Cow;

use validator::ValidationError;

const DEVICES: [&str; 4] = ["cpu", "gpu", "cuda", "metal"];

pub fn known_device(value: &str) -> Result<(), ValidationError> {
    if DEVICES.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::new("unknown_device").with_message(Cow::from(format!(
        "device must be one of {}",
        DEVICES.join(", ")
    ))))
}

pub fn shell_words(value: &str) -> Result<(), ValidationError> {
    if shlex::split(value).is_none() {
        return Err(ValidationError::new("invalid_args")
            .with_message(Cow::from("args must be valid shell words")));
    }
    Ok(())
}

/// A file name, not a path.
pub fn bare_file_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == ".." {
        return Err(ValidationError::new("invalid_file_name")
            .with_message(Cow::from("file name cannot be empty or contain a path")));
    }
    Ok(())
}
