use caption_core::vtt::parse_vtt;
use caption_core::{parse_document, CaptionSource, UploadDate};
use criterion::{criterion_group, criterion_main, Criterion};

fn sample_track(cues: usize) -> String {
    let mut out = String::from("WEBVTT\nKind: captions\nLanguage: en\n\n");
    for i in 0..cues {
        let (start, end) = (i * 2, i * 2 + 2);
        out.push_str(&format!(
            "00:{:02}:{:02}.000 --> 00:{:02}:{:02}.000 align:start position:0%\nline {i} of the <c>sample</c> [Music] transcript\n\n",
            start / 60 % 60, start % 60, end / 60 % 60, end % 60
        ));
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let track = sample_track(1500);
    let upload_date = UploadDate::parse("20240101").expect("valid date");
    let source = CaptionSource { video_id: "bench", file_name: "Bench [bench].en.vtt", upload_date };
    c.bench_function("parse_vtt_1500_cues", |b| b.iter(|| parse_vtt("bench.vtt", &track)));
    let cues = parse_vtt("bench.vtt", &track).expect("valid track");
    c.bench_function("parse_document_1500_cues", |b| b.iter(|| parse_document(&source, &cues)));
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
