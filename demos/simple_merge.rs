use subword_bpe::{corpus::WordCounts, BpeConfig, BpeTrainer};

fn main() {
    // Example: 5 x "low", 2 x "lower", 6 x "newest", 3 x "widest"
    let counts: WordCounts = [("low", 5), ("lower", 2), ("newest", 6), ("widest", 3)]
        .into_iter()
        .collect();

    let mut trainer = BpeTrainer::new(&counts, &BpeConfig::default());

    println!("Initial:");
    print_state(&trainer, &counts);

    trainer.train(3);

    println!("\nAfter 3 merges:");
    print_state(&trainer, &counts);

    println!("\nMerges:");
    for merge in trainer.codes().iter() {
        println!("  {} + {} ({})", merge.left, merge.right, merge.count.unwrap_or_default());
    }
}

fn print_state(trainer: &BpeTrainer, counts: &WordCounts) {
    for (i, (word, freq)) in counts.iter().enumerate() {
        println!("  {word:>8} x{freq}: {}", trainer.segmentation(i).join(" "));
    }
}
