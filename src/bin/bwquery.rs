use std::error::Error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bigwig_remote::{BigWigFile, GenomicRange, ZoomQuery};

#[derive(Clone, Debug, Parser)]
#[command(
    name = "bwquery",
    about = "Queries a remote bigWig over HTTP range requests.",
    long_about = None,
)]
struct Args {
    /// The URI of the bigWig file.
    pub uri: String,

    /// A region to query, as chrom:start-end. Without it, file info is
    /// printed instead.
    #[arg(long)]
    pub region: Option<String>,

    /// Forward range requests through this proxy endpoint.
    #[arg(long)]
    pub forward_uri: Option<String>,

    /// Cache block size in KiB. 0 disables caching.
    #[arg(long)]
    pub cache_block_kib: Option<u64>,

    /// Read this zoom level instead of full-resolution data.
    #[arg(long)]
    pub zoom: Option<usize>,

    /// Cap on returned items; a zoom level is picked adaptively.
    #[arg(long)]
    pub max_items: Option<u64>,

    /// If set, will print out the list of chromosomes and their sizes.
    #[arg(long)]
    #[arg(default_value_t = false)]
    pub chroms: bool,

    /// If set, will print out the list of all zoom levels.
    #[arg(long)]
    #[arg(default_value_t = false)]
    pub zooms: bool,
}

fn parse_region(region: &str) -> Result<GenomicRange, String> {
    let (chrom, span) = region
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid region `{}`: expected chrom:start-end", region))?;
    let (start, end) = span
        .split_once('-')
        .ok_or_else(|| format!("invalid region `{}`: expected chrom:start-end", region))?;
    let start: u32 = start
        .replace(',', "")
        .parse()
        .map_err(|_| format!("invalid region start `{}`", start))?;
    let end: u32 = end
        .replace(',', "")
        .parse()
        .map_err(|_| format!("invalid region end `{}`", end))?;
    Ok(GenomicRange::new(chrom, start, end))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut bigwig = BigWigFile::open_uri(
        &args.uri,
        args.forward_uri.as_deref(),
        args.cache_block_kib,
    )?;
    bigwig.initialized().await?;

    if let Some(region) = &args.region {
        let range = parse_region(region)?;
        let zoom = match (args.zoom, args.max_items) {
            (Some(level), _) => Some(ZoomQuery::level(level)),
            (None, Some(max_items)) => Some(ZoomQuery::adaptive(Some(max_items), None)),
            (None, None) => None,
        };
        let records = bigwig.query(Some(range), zoom).await?;
        for record in &records {
            println!("{}", record);
        }
        return Ok(());
    }

    if let Some(summary) = bigwig.summary() {
        println!("basesCovered: {}", summary.bases_covered);
        if summary.bases_covered > 0 {
            println!("mean: {:.6}", summary.sum / summary.bases_covered as f64);
        }
        println!("min: {:.6}", summary.min_val);
        println!("max: {:.6}", summary.max_val);
    }
    if let Some(zoom_levels) = bigwig.zoom_levels() {
        println!("zoomLevels: {}", zoom_levels);
    }
    if args.zooms {
        if let Some(zoom_headers) = bigwig.zoom_headers() {
            for zoom in zoom_headers {
                println!("\t{}", zoom.reduction_level);
            }
        }
    }
    if let Some(chromosomes) = bigwig.chromosomes() {
        println!("chromCount: {}", chromosomes.len());
        if args.chroms {
            for chrom in chromosomes {
                println!("\t{} {} {}", chrom.name, chrom.id, chrom.length);
            }
        }
    }

    Ok(())
}
