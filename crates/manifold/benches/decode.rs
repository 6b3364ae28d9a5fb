//! Benchmark – the three decoders over equivalent documents.
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use manifold::{
    ByteBuf, EventSink, JsonDecoder, MarkupDecoder, NativeDecoder, SliceSource, Tag,
};

/// A sink that accepts everything and only counts calls, so decoder and
/// buffer work dominates the measurement.
struct Counter {
    events: usize,
}

impl EventSink for Counter {
    fn open(&mut self, _tag: Tag<'_>, _key: &ByteBuf) -> bool {
        self.events += 1;
        true
    }

    fn submit(&mut self, _tag: Tag<'_>, _key: &ByteBuf, _value: &ByteBuf) {
        self.events += 1;
    }

    fn close(&mut self) -> bool {
        self.events += 1;
        true
    }
}

/// Deterministic documents with `records` equivalent user records each, one
/// per format.
fn make_payloads(records: usize) -> (String, String, String) {
    let mut native = String::from("{");
    let mut json = String::from("{\"users\":{");
    let mut markup = String::from("<users>");
    for i in 0..records {
        if i > 0 {
            native.push(',');
            json.push(',');
        }
        native.push_str(&format!("u{i}{{id={i},name=user{i},active=true}}"));
        json.push_str(&format!(
            "\"u{i}\":{{\"id\":{i},\"name\":\"user{i}\",\"active\":true}}"
        ));
        markup.push_str(&format!(
            "<u{i}><id>{i}</id><name>user{i}</name><active>true</active></u{i}>"
        ));
    }
    native.push('}');
    json.push_str("}}");
    markup.push_str("</users>");
    (native, json, markup)
}

fn bench_decoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for records in [10usize, 100, 1000] {
        let (native, json, markup) = make_payloads(records);

        group.bench_with_input(BenchmarkId::new("native", records), &native, |b, doc| {
            let mut decoder = NativeDecoder::new();
            b.iter(|| {
                let mut sink = Counter { events: 0 };
                let mut src = SliceSource::from(doc.as_str());
                decoder.decode(&mut src, &mut sink).unwrap();
                black_box(sink.events)
            });
        });

        group.bench_with_input(BenchmarkId::new("json", records), &json, |b, doc| {
            let mut decoder = JsonDecoder::new();
            b.iter(|| {
                let mut sink = Counter { events: 0 };
                let mut src = SliceSource::from(doc.as_str());
                decoder.decode(&mut src, &mut sink).unwrap();
                black_box(sink.events)
            });
        });

        group.bench_with_input(BenchmarkId::new("markup", records), &markup, |b, doc| {
            let mut decoder = MarkupDecoder::new();
            b.iter(|| {
                let mut sink = Counter { events: 0 };
                let mut src = SliceSource::from(doc.as_str());
                decoder.decode(&mut src, &mut sink).unwrap();
                black_box(sink.events)
            });
        });
    }
    group.finish();
}

fn bench_rejected_skip(c: &mut Criterion) {
    /// Rejects every container under the root, so almost the whole
    /// document travels through the skip routines.
    struct RejectInner {
        depth: usize,
    }

    impl EventSink for RejectInner {
        fn open(&mut self, _tag: Tag<'_>, _key: &ByteBuf) -> bool {
            if self.depth >= 1 {
                return false;
            }
            self.depth += 1;
            true
        }

        fn submit(&mut self, _tag: Tag<'_>, _key: &ByteBuf, _value: &ByteBuf) {}

        fn close(&mut self) -> bool {
            self.depth -= 1;
            true
        }
    }

    let (native, json, _) = make_payloads(1000);
    let mut group = c.benchmark_group("skip");

    group.bench_function("native", |b| {
        let mut decoder = NativeDecoder::new();
        b.iter(|| {
            let mut sink = RejectInner { depth: 0 };
            let mut src = SliceSource::from(native.as_str());
            decoder.decode(&mut src, &mut sink).unwrap();
        });
    });

    group.bench_function("json", |b| {
        let mut decoder = JsonDecoder::new();
        b.iter(|| {
            let mut sink = RejectInner { depth: 0 };
            let mut src = SliceSource::from(json.as_str());
            decoder.decode(&mut src, &mut sink).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decoders, bench_rejected_skip);
criterion_main!(benches);
