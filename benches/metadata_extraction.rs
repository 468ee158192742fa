//! Benchmarks for metadata extraction and write-back.
//!
//! Extraction runs for every document of a corpus on each scan, so its cost
//! scales with corpus size and body length.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use texcorpus::metadata::{extract, extract_detailed, rewrite, TexKeyMap};

/// Block and command declarations on a short body.
const TYPICAL_SOURCE: &str = r#"%### BEGIN metadata ###
% id: DOC-0000000042
% title: Statique du solide
% doc_type: td
% class: PTSI
% subject: SI
% version: 3
% tags: [forces, moments, liaisons]
%### END metadata ###
\documentclass{article}
\newcommand{\DocAuthor}{A. Dupont}
\begin{document}
\section{Principe fondamental}
Isoler le solide, faire le bilan des actions.
\end{document}
"#;

/// Command declarations only.
const COMMANDS_SOURCE: &str = r#"\documentclass{article}
\newcommand{\DocTitle}{Cinématique du point}
\newcommand{\DocType}{cours}
\newcommand{\DocClass}{MPSI}
\begin{document}
Vitesse et accélération.
\end{document}
"#;

/// `TYPICAL_SOURCE` followed by `paragraphs` paragraphs of body text.
fn long_source(paragraphs: usize) -> String {
    let mut source = TYPICAL_SOURCE.replace("\\end{document}\n", "");
    for i in 0..paragraphs {
        source.push_str(&format!(
            "\\subsection{{Partie {}}}\nUn paragraphe avec des % commentaires et $x_{}$.\n\n",
            i, i
        ));
    }
    source.push_str("\\end{document}\n");
    source
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_extraction");
    let keys = TexKeyMap::default();

    group.bench_function("block_and_commands", |b| {
        b.iter(|| extract(black_box(TYPICAL_SOURCE)))
    });

    group.bench_function("commands_only", |b| {
        b.iter(|| extract(black_box(COMMANDS_SOURCE)))
    });

    group.bench_function("detailed", |b| {
        b.iter(|| extract_detailed(black_box(TYPICAL_SOURCE), &keys))
    });

    group.finish();
}

fn bench_body_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_body_scaling");

    for paragraphs in [10, 100, 1000] {
        let source = long_source(paragraphs);
        group.bench_with_input(
            BenchmarkId::new("paragraphs", paragraphs),
            &source,
            |b, source| b.iter(|| extract(black_box(source))),
        );
    }

    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_rewrite");
    let keys = TexKeyMap::default();
    let (mut metadata, _) = extract(TYPICAL_SOURCE);
    metadata.set("version", 4i64);
    metadata.set("title", "Statique du solide (révisé)");

    group.bench_function("typical", |b| {
        b.iter(|| rewrite(black_box(TYPICAL_SOURCE), &metadata, &keys))
    });

    let long = long_source(1000);
    group.bench_function("long_body", |b| {
        b.iter(|| rewrite(black_box(&long), &metadata, &keys))
    });

    group.finish();
}

criterion_group!(benches, bench_extraction, bench_body_scaling, bench_rewrite);
criterion_main!(benches);
