//! Object copy tool - `ocp`
//!
//! `ocp` copies one object into one or more target objects in a single pass. The source is read
//! once and every chunk is written to all targets, so copying to N places costs one read.
//!
//! Objects are addressed as `bucket/key`. With the filesystem provider a bucket is a
//! directory under `--root` and the key is a relative path inside it:
//!
//! ```bash
//! # copy one object into two buckets
//! ocp --root /srv/store src/data.bin backup1/data.bin backup2/data.bin --summary
//!
//! # quiet mode, no progress output
//! ocp -q src/data.bin mirror/data.bin
//! ```
//!
//! Targets are written to a partial file and only become visible once their length and hash
//! match the source. A failure reports a short message such as `Unable to write to target`;
//! rerun with `--debug` to see the full cause.

pub mod path;
