//! Plain-text output.

use crowdintel_rag::{Answer, CollectionInfo, IngestionReport, RetrievedDocument};

pub fn ingestion_report(report: &IngestionReport) {
    println!(
        "Indexed {} document(s) into {} (alias {})",
        report.document_count, report.collection, report.alias
    );
    if let Some(dimensions) = report.dimensions {
        println!("  dimensions: {dimensions}");
    }
    if let Some(previous) = &report.previous {
        println!("  previous generation kept for rollback: {previous}");
    }
    for pruned in &report.pruned {
        println!("  pruned: {pruned}");
    }
}

pub fn answer(answer: &Answer) {
    if let Some(prompt) = &answer.prompt {
        println!("--- prompt ---\n{prompt}\n--- end prompt ---\n");
    }
    println!("{}", answer.answer);
    if !answer.documents.is_empty() {
        println!("\nSources:");
        documents(&answer.documents);
    }
}

pub fn documents(documents: &[RetrievedDocument]) {
    if documents.is_empty() {
        println!("No documents found.");
        return;
    }
    for (rank, doc) in documents.iter().enumerate() {
        println!("  [{}] {} (distance {:.4}) {}", rank + 1, doc.id, doc.distance, doc.metadata.title);
    }
}

pub fn status(alias: &str, current: Option<&str>, generations: &[CollectionInfo]) {
    match current {
        Some(current) => println!("{alias} -> {current}"),
        None => println!("{alias} has not been ingested yet"),
    }
    for info in generations {
        let marker = if Some(info.name.as_str()) == current { "*" } else { " " };
        println!(
            "{marker} {}  {} document(s)  model {}  created {}",
            info.name,
            info.document_count,
            info.embedding_model,
            info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}
