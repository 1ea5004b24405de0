use anyhow::{Context, anyhow};
use common::Locator;

/// Parses `bucket/key`, with an optional leading `/`.
///
/// The bucket is everything up to the first `/`; both parts must be non-empty and the key must
/// name an object, not a prefix.
pub fn parse_locator(locator: &str) -> anyhow::Result<Locator> {
    let trimmed = locator.strip_prefix('/').unwrap_or(locator);
    let (bucket, key) = trimmed
        .split_once('/')
        .ok_or_else(|| anyhow!("{locator:?} is not of the form bucket/key"))?;
    if bucket.is_empty() {
        return Err(anyhow!("{locator:?} has an empty bucket name"));
    }
    if key.is_empty() {
        return Err(anyhow!("{locator:?} has an empty key"));
    }
    if key.ends_with('/') {
        return Err(anyhow!(
            "{locator:?} ends with '/', only single objects can be copied"
        ));
    }
    Ok(Locator::new(bucket, key))
}

/// Splits command line paths into the source and its targets.
///
/// The first path is the source, all remaining ones are targets. Targets must be distinct and
/// none may be the source itself.
pub fn parse_locators(paths: &[String]) -> anyhow::Result<(Locator, Vec<Locator>)> {
    let (source, targets) = match paths {
        [source, targets @ ..] if !targets.is_empty() => (source, targets),
        _ => {
            return Err(anyhow!(
                "expected a source and at least one target, got {} path(s)",
                paths.len()
            ));
        }
    };
    let source = parse_locator(source).context("invalid source")?;
    let mut parsed: Vec<Locator> = Vec::with_capacity(targets.len());
    for target in targets {
        let target = parse_locator(target).context("invalid target")?;
        if target == source {
            return Err(anyhow!("target {target} is the same as the source"));
        }
        if parsed.contains(&target) {
            return Err(anyhow!("target {target} is given more than once"));
        }
        parsed.push(target);
    }
    Ok((source, parsed))
}
