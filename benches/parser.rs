use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_h1::codec::Parser;
use micro_h1::handler::MessageHandler;
use micro_h1::protocol::Mode;

static SMALL_GET: &str = "GET /index.html HTTP/1.1\r\n\
    Host: 127.0.0.1:8080\r\n\
    User-Agent: curl/7.79.1\r\n\
    Accept: */*\r\n\
    \r\n";

static CHUNKED_POST: &str = "POST /upload HTTP/1.1\r\n\
    Host: 127.0.0.1:8080\r\n\
    Transfer-Encoding: chunked\r\n\
    \r\n\
    10\r\n1234567890abcdef\r\n\
    10\r\n1234567890abcdef\r\n\
    0\r\n\r\n";

struct Sink;

impl MessageHandler for Sink {}

fn benchmark_parser(criterion: &mut Criterion) {
    let cases = [("small_get", SMALL_GET), ("chunked_post", CHUNKED_POST)];
    let mut group = criterion.benchmark_group("parser");

    for (name, input) in cases {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, input| {
            b.iter_batched_ref(
                || Parser::new(Mode::Request),
                |parser| {
                    let consumed = parser
                        .execute(&mut Sink, input.as_bytes())
                        .expect("input should be a valid http request");
                    black_box(consumed);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(parser, benchmark_parser);
criterion_main!(parser);
