use std::fmt::Write;

use cadence_core::Transaction;

/// Beancount-style text rendering. Tags and metadata iterate in BTree
/// order, so output for a fixed input is byte-stable.
pub fn render_transaction(txn: &Transaction, currency: &str) -> String {
    let mut out = String::new();
    write!(
        out,
        "{} {} \"{}\" \"{}\"",
        txn.date, txn.flag, txn.payee, txn.narration
    )
    .unwrap();
    for tag in &txn.tags {
        write!(out, " #{tag}").unwrap();
    }
    out.push('\n');

    for (key, value) in &txn.metadata {
        writeln!(out, "  {key}: \"{value}\"").unwrap();
    }

    for posting in &txn.postings {
        match posting.amount {
            Some(amount) => write!(out, "  {}  {} {}", posting.account, amount, currency).unwrap(),
            None => write!(out, "  {}", posting.account).unwrap(),
        }
        if let Some(narration) = &posting.narration {
            write!(out, " ; {narration}").unwrap();
        }
        out.push('\n');
    }
    out
}

pub fn render_ledger<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    currency: &str,
) -> String {
    let blocks: Vec<String> = transactions
        .into_iter()
        .map(|txn| render_transaction(txn, currency))
        .collect();
    blocks.join("\n")
}
