mod common;

#[cfg(test)]
mod tests {
    use super::common;
    use avbridge::{
        averror, Bridge, BridgeError, CustomInput, CustomOutput, Field, InputOptions, IoCallbacks, NativePtr,
        OutputOptions, Rational,
    };
    use bytes::Bytes;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn bridge() -> Arc<Bridge> {
        Arc::new(Bridge::load_with(&common::loader(), &common::config()).unwrap())
    }

    fn sink() -> (IoCallbacks, Arc<Mutex<Vec<u8>>>) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let target = out.clone();
        let callbacks = IoCallbacks::new().with_write(move |buf| {
            target.lock().extend_from_slice(buf);
            Ok(buf.len())
        });
        (callbacks, out)
    }

    #[test]
    fn test_round_trip_through_muxer() {
        let bridge = bridge();
        let (callbacks, out) = sink();
        let output = CustomOutput::open(&bridge, callbacks, "fake", OutputOptions::default().with_buffer_size(4)).unwrap();

        assert_eq!(output.add_stream(Rational::new(1, 90000)).unwrap(), 0);
        assert_eq!(output.add_stream(Rational::new(1, 48000)).unwrap(), 1);
        assert_eq!(output.stream_count(), 2);
        let second = output.stream(1).unwrap();
        assert_eq!(
            bridge.fields().get_rational(Field::StreamTimeBase, second),
            Rational::new(1, 48000)
        );

        output.write_header().unwrap();
        let payload = b"payload-bytes";
        let mut pkt = common::packet(payload);
        unsafe { output.write_packet(NativePtr::from_raw(pkt.as_mut_ptr())).unwrap() };
        unsafe { output.write_packet(NativePtr::null()).unwrap() };
        output.write_trailer().unwrap();

        let written = out.lock().clone();
        assert_eq!(written, b"FAKE\x02payload-bytesEND".to_vec());

        // the fake demuxer reads back what the fake muxer wrote
        let input = CustomInput::open(
            &bridge,
            IoCallbacks::from_bytes(Bytes::from(written)),
            InputOptions::default(),
        )
        .unwrap();
        assert_eq!(input.stream_count(), 2);
    }

    #[test]
    fn test_close_writes_trailer_then_frees_context_then_io() {
        let bridge = bridge();
        let (callbacks, out) = sink();
        let output = CustomOutput::open(&bridge, callbacks, "fake", OutputOptions::default()).unwrap();
        output.add_stream(Rational::new(1, 25)).unwrap();
        output.write_header().unwrap();
        // nothing has left the 32k buffer yet
        assert!(out.lock().is_empty());

        let ctx = output.as_ptr();
        let avio = output.io_ptr();
        assert_eq!(bridge.fields().get_ptr(Field::FormatIoContext, ctx), avio);

        output.close();
        assert_eq!(out.lock().as_slice(), b"FAKE\x01END");
        assert!(common::context_freed(ctx));
        assert!(common::avio_freed(avio));
        assert!(output.as_ptr().is_null());
        assert!(output.io_ptr().is_null());

        output.close();
        assert_eq!(out.lock().as_slice(), b"FAKE\x01END");
    }

    #[test]
    fn test_drop_without_header_writes_nothing() {
        let bridge = bridge();
        let (callbacks, out) = sink();
        let output = CustomOutput::open(&bridge, callbacks, "fake", OutputOptions::default()).unwrap();
        output.add_stream(Rational::new(1, 25)).unwrap();
        let ctx = output.as_ptr();
        let avio = output.io_ptr();
        let handle = output.io_handle();

        drop(output);
        assert!(out.lock().is_empty());
        assert!(common::context_freed(ctx));
        assert!(common::avio_freed(avio));
        assert!(avbridge::HandleTable::global().lookup_any(handle).is_none());
    }

    #[test]
    fn test_stage_order_enforced() {
        let bridge = bridge();
        let (callbacks, _out) = sink();
        let output = CustomOutput::open(&bridge, callbacks, "fake", OutputOptions::default()).unwrap();

        assert!(matches!(output.write_trailer(), Err(BridgeError::InvalidArgument(_))));
        assert!(matches!(
            unsafe { output.write_packet(NativePtr::null()) },
            Err(BridgeError::InvalidArgument(_))
        ));
        // the fake muxer refuses a header without streams
        assert_eq!(output.write_header().unwrap_err().code(), Some(averror::EINVAL));

        output.add_stream(Rational::new(1, 25)).unwrap();
        output.write_header().unwrap();
        assert!(matches!(output.write_header(), Err(BridgeError::InvalidArgument(_))));
        assert!(matches!(
            output.add_stream(Rational::new(1, 25)),
            Err(BridgeError::InvalidArgument(_))
        ));

        output.write_trailer().unwrap();
        assert!(matches!(output.write_trailer(), Err(BridgeError::InvalidArgument(_))));
        output.close();
        assert!(matches!(
            output.add_stream(Rational::new(1, 25)),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_muxer() {
        let bridge = bridge();
        let (callbacks, _out) = sink();
        let err = CustomOutput::open(&bridge, callbacks, "nope", OutputOptions::default()).unwrap_err();
        assert_eq!(err.code(), Some(averror::EINVAL));

        let (callbacks, _out) = sink();
        let err = CustomOutput::open(&bridge, callbacks, "a\0b", OutputOptions::default()).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_output_needs_write_callback() {
        let bridge = bridge();
        let err = CustomOutput::open(
            &bridge,
            IoCallbacks::from_bytes(Bytes::from_static(b"read only")),
            "fake",
            OutputOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_muxing_needs_format_entry_points() {
        let loader = common::loader_with(
            common::avutil(),
            common::avcodec(),
            common::avformat().without_symbol("avformat_alloc_output_context2"),
        );
        let bridge = Arc::new(Bridge::load_with(&loader, &common::config()).unwrap());
        let (callbacks, _out) = sink();
        let err = CustomOutput::open(&bridge, callbacks, "fake", OutputOptions::default()).unwrap_err();
        assert!(
            matches!(err, BridgeError::Unavailable { ref feature } if feature == "avformat_alloc_output_context2")
        );
    }
}
