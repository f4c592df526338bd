//! Byte offsets of struct fields, per major version of the owning library.
//!
//! Offsets follow the FFmpeg 6.x and 7.x headers (avformat and avcodec 60
//! and 61, avutil 58 and 59) on 64-bit targets. The only entries keyed to
//! older majors are the leading members of `AVFormatContext` and
//! `AVIOContext`, which sit at the same place in every supported avformat.
//! Anything not listed here is reached through the stable option API or the
//! shim, or not at all.

use super::Field;

/// (field, owning library majors, byte offset)
type Entry = (Field, &'static [u32], usize);

const FORMAT_60: &[u32] = &[60];
const FORMAT_61: &[u32] = &[61];
const FORMAT_60_61: &[u32] = &[60, 61];
const FORMAT_ANY: &[u32] = &[58, 59, 60, 61];
const CODEC_ANY: &[u32] = &[60, 61];
const UTIL_ANY: &[u32] = &[58, 59];

static TABLE: &[Entry] = &[
    // AVFormatContext. Up to streams the layout predates avformat 58;
    // avformat 61 inserts nb_stream_groups/stream_groups
    // after streams, shifting everything from url onward by 16.
    (Field::FormatOutputFormat, FORMAT_ANY, 16),
    (Field::FormatIoContext, FORMAT_ANY, 32),
    (Field::FormatNbStreams, FORMAT_ANY, 44),
    (Field::FormatStreams, FORMAT_ANY, 48),
    (Field::FormatDuration, FORMAT_60, 72),
    (Field::FormatDuration, FORMAT_61, 88),
    (Field::FormatBitRate, FORMAT_60, 80),
    (Field::FormatBitRate, FORMAT_61, 96),
    (Field::FormatFlags, FORMAT_60, 96),
    (Field::FormatFlags, FORMAT_61, 112),
    (Field::FormatNbChapters, FORMAT_60, 164),
    (Field::FormatNbChapters, FORMAT_61, 180),
    (Field::FormatChapters, FORMAT_60, 168),
    (Field::FormatChapters, FORMAT_61, 184),
    (Field::FormatMetadata, FORMAT_60, 176),
    (Field::FormatMetadata, FORMAT_61, 192),
    // AVStream. Before avformat 60 it has no av_class and index sits at 0.
    (Field::StreamIndex, FORMAT_60_61, 8),
    (Field::StreamId, FORMAT_60_61, 12),
    (Field::StreamCodecPar, FORMAT_60_61, 16),
    (Field::StreamTimeBase, FORMAT_60_61, 32),
    (Field::StreamMetadata, FORMAT_60_61, 80),
    (Field::StreamAvgFrameRate, FORMAT_60_61, 88),
    // AVChapter
    (Field::ChapterId, FORMAT_60_61, 0),
    (Field::ChapterTimeBase, FORMAT_60_61, 8),
    (Field::ChapterStart, FORMAT_60_61, 16),
    (Field::ChapterEnd, FORMAT_60_61, 24),
    (Field::ChapterMetadata, FORMAT_60_61, 32),
    // AVOutputFormat
    (Field::OutputFormatFlags, FORMAT_60_61, 44),
    // AVIOContext, same since avformat 58
    (Field::IoBuffer, FORMAT_ANY, 8),
    (Field::IoBufferSize, FORMAT_ANY, 16),
    // AVCodecParameters
    (Field::CodecParType, CODEC_ANY, 0),
    (Field::CodecParCodecId, CODEC_ANY, 4),
    (Field::CodecParFormat, CODEC_ANY, 28),
    (Field::CodecParWidth, CODEC_ANY, 56),
    (Field::CodecParHeight, CODEC_ANY, 60),
    (Field::CodecParSampleRate, CODEC_ANY, 116),
    (Field::CodecParChannels, CODEC_ANY, 148),
    // AVCodecContext
    (Field::CodecCtxType, CODEC_ANY, 12),
    (Field::CodecCtxCodecId, CODEC_ANY, 24),
    (Field::CodecCtxBitRate, CODEC_ANY, 56),
    (Field::CodecCtxFlags, CODEC_ANY, 76),
    (Field::CodecCtxTimeBase, CODEC_ANY, 100),
    (Field::CodecCtxWidth, CODEC_ANY, 116),
    (Field::CodecCtxHeight, CODEC_ANY, 120),
    (Field::CodecCtxGopSize, CODEC_ANY, 132),
    (Field::CodecCtxPixFmt, CODEC_ANY, 136),
    (Field::CodecCtxMaxBFrames, CODEC_ANY, 160),
    (Field::CodecCtxSampleRate, CODEC_ANY, 352),
    (Field::CodecCtxSampleFmt, CODEC_ANY, 360),
    (Field::CodecCtxFrameSize, CODEC_ANY, 364),
    (Field::CodecCtxFramerate, CODEC_ANY, 704),
    // ch_layout at 912, nb_channels is its second int
    (Field::CodecCtxChannels, CODEC_ANY, 916),
    // AVPacket
    (Field::PacketPts, CODEC_ANY, 8),
    (Field::PacketDts, CODEC_ANY, 16),
    (Field::PacketData, CODEC_ANY, 24),
    (Field::PacketSize, CODEC_ANY, 32),
    (Field::PacketStreamIndex, CODEC_ANY, 36),
    (Field::PacketFlags, CODEC_ANY, 40),
    (Field::PacketDuration, CODEC_ANY, 64),
    (Field::PacketPos, CODEC_ANY, 72),
    // AVFrame
    (Field::FrameWidth, UTIL_ANY, 104),
    (Field::FrameHeight, UTIL_ANY, 108),
    (Field::FrameNbSamples, UTIL_ANY, 112),
    (Field::FrameFormat, UTIL_ANY, 116),
    (Field::FramePts, UTIL_ANY, 136),
    (Field::FrameSampleRate, UTIL_ANY, 216),
];

/// Result of looking a field up for one loaded major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(usize),
    /// Listed, but only for other majors.
    OtherVersions,
    NotListed,
}

pub fn lookup(field: Field, major: u32) -> Lookup {
    let mut listed = false;
    for (entry_field, majors, offset) in TABLE {
        if *entry_field != field {
            continue;
        }
        if majors.contains(&major) {
            return Lookup::Found(*offset);
        }
        listed = true;
    }
    if listed {
        Lookup::OtherVersions
    } else {
        Lookup::NotListed
    }
}
