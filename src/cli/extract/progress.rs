use anyhow::Result;
use dvdvideo::process::vob::PassEnd;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Instant;

pub fn create_progress_bar(multi: &MultiProgress, sectors: u32, name: &str) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(sectors as u64));
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} sectors ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
    )?);

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(format!("demuxing {name}"));
    Ok(pb)
}

pub fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    name: &str,
    end: PassEnd,
    streams: usize,
    start_time: Instant,
) {
    if let Some(pb) = pb {
        let elapsed = start_time.elapsed().as_secs_f64();
        let sectors = pb.position();
        let speed = if elapsed > 0.0 {
            sectors as f64 * 2048.0 / 1_000_000.0 / elapsed
        } else {
            0.0
        };

        pb.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} sectors ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let status = match end {
            PassEnd::Completed => "done".to_string(),
            PassEnd::Truncated(offset) => format!("truncated at {offset:#x}"),
            PassEnd::Aborted => "aborted".to_string(),
        };
        pb.finish_with_message(format!(
            "{name}: {status} | streams: {streams} | speed: {speed:.1} MB/s"
        ));
    }
}
