/*!
bigwig-remote is a read-only client for the bigWig file format, designed for
files that live behind an HTTP server supporting `Range` requests. Queries
fetch only the byte ranges they need: the header, the chromosome directory,
the slices of the R-tree index that overlap the query, and the matching
compressed data sections.

## Reading

The entrypoint is [`BigWigFile::open_uri`], which builds a handle over a
[`RemoteFile`][utils::file::remote::RemoteFile] transport, or
[`BigWigFile::open`], which accepts any
[`RangeSource`][utils::file::remote::RangeSource] (useful for local files and
tests). A handle initializes itself lazily on first use; `initialized` can be
awaited explicitly to surface transport errors early.

```no_run
# use bigwig_remote::{BigWigFile, GenomicRange, ZoomQuery};
# async fn example() -> Result<(), Box<dyn std::error::Error>> {
let mut bw = BigWigFile::open_uri(
    "https://example.com/tracks/signal.bigWig",
    None,
    None,
)?;
bw.initialized().await?;

let records = bw
    .query(Some(GenomicRange::new("chr1", 0, 100_000)), None)
    .await?;
for r in &records {
    println!("{}", r);
}

// The same region, pre-aggregated to at most ~1000 items.
let zoomed = bw
    .query(
        Some(GenomicRange::new("chr1", 0, 100_000)),
        Some(ZoomQuery::adaptive(Some(1000), None)),
    )
    .await?;
# Ok(())
# }
```

All I/O goes through a block-granular
[`RangeCache`][utils::file::range_cache::RangeCache] that coalesces
concurrent reads of the same 512 KiB block into a single request, which keeps
the number of round trips bounded during R-tree descent.
*/

mod bbi;
pub mod utils;

pub use bbi::*;
