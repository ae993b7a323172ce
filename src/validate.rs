use crate::image_ref::ImageRef;

/// Syntactic check only: no parsing beyond the scheme prefix, no reachability.
pub fn is_valid_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub fn is_supported_format<S: AsRef<str>>(image: &ImageRef, allowed_formats: &[S]) -> bool {
    let Some(format) = image.format() else {
        return false;
    };
    allowed_formats.iter().any(|f| f.as_ref() == format)
}

pub fn dimensions_equal(a: &ImageRef, b: &ImageRef) -> bool {
    a.width() == b.width() && a.height() == b.height()
}
