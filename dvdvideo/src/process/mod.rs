/// MPEG-2 start-code chunking.
pub mod chunk;

/// Chapter hierarchy of title and menu passes.
pub mod chapters;

/// Routing of demuxed packets to writers.
///
/// Provides the [`DemuxSink`](demux::DemuxSink) trait and the
/// [`CompositeDemuxWriter`](demux::CompositeDemuxWriter) addressing writers by
/// stream id.
pub mod demux;

/// MPEG-2 frame reordering.
///
/// Provides the [`M2vParser`](m2v::M2vParser) turning an elementary stream
/// into [`MpegFrame`](m2v::MpegFrame) objects in presentation order.
pub mod m2v;

/// VOB program stream demultiplexing.
pub mod vob;

/// Per-format output writers.
pub mod writer;
