/// Location of a single object: the bucket it lives in and its key within that bucket.
///
/// The textual form `bucket/key` is stable and is what every diagnostic refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    bucket: String,
    key: String,
}

impl Locator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_bucket_and_key() {
        let locator = Locator::new("photos", "2024/beach.jpg");
        assert_eq!(locator.to_string(), "photos/2024/beach.jpg");
        assert_eq!(locator.bucket(), "photos");
        assert_eq!(locator.key(), "2024/beach.jpg");
    }
}
