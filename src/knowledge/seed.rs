//! Default seed document.
//!
//! The knowledge base must always be able to bootstrap, so when no seed
//! document exists on disk one is synthesized with the demonstration corpus
//! below (legal topics plus a few deliberately unrelated paragraphs).

use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_SEED: &str = concat!(
    "A contract is a legally binding agreement between two or more parties. For a contract to be valid and enforceable, several essential elements must generally be present. These include: Offer, Acceptance, Consideration, Mutual Assent, Legal Capacity, and Lawful Object. Contracts can be written, oral, or implied by conduct. However, some types of contracts, such as those involving real estate or those that cannot be performed within one year, may be required by law (Statute of Frauds) to be in writing to be enforceable. Breach of contract occurs when one party fails to fulfill their obligations as specified in the agreement, which can lead to remedies such as damages or specific performance.\n\n",
    "In tort law, negligence is a legal theory under which a person can be held liable for injuries to another person caused by their failure to exercise reasonable care. To prove negligence, a plaintiff typically must establish four key elements: Duty of Care, Breach of Duty, Causation, and Damages. Defenses to negligence claims can include contributory negligence or assumption of risk.\n\n",
    "Copyright law grants creators of original works of authorship exclusive rights to their works, such as books, music, and films. Protection arises automatically once an original work is fixed in a tangible medium. Exclusive rights include reproduction, distribution, performance, and display. Limitations like 'fair use' allow certain uses without permission. The duration of copyright typically lasts for the life of the author plus 70 years.\n\n",
    "A car, or automobile, is a wheeled motor vehicle used for transportation.\n\n",
    "Retrieval-Augmented Generation (RAG) is an AI framework that retrieves facts from an external knowledge base to ground large language models (LLMs) on authoritative sources and prevent hallucination.\n\n",
    "MongoDB is a popular NoSQL database that uses JSON-like documents with optional schemas.\n\n",
    "React is a free and open-source front-end JavaScript library for building user interfaces based on components.\n\n",
    "FAISS (Facebook AI Similarity Search) is a library for efficient similarity search and clustering of dense vectors.\n\n",
);

/// Reads the seed document, writing the default content first if the file
/// does not exist yet.
pub fn ensure_seed_document(path: &Path) -> io::Result<String> {
    if path.exists() {
        return fs::read_to_string(path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_SEED)?;
    tracing::info!("Seed document not found; created {}", path.display());
    Ok(DEFAULT_SEED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_the_default_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents").join("sample.txt");

        let text = ensure_seed_document(&path).unwrap();

        assert!(path.exists());
        assert_eq!(text, DEFAULT_SEED);
        assert!(text.contains("negligence"));
        assert!(text.contains("FAISS"));
    }

    #[test]
    fn leaves_an_existing_seed_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sample.txt");
        fs::write(&path, "Custom corpus.").unwrap();

        let text = ensure_seed_document(&path).unwrap();

        assert_eq!(text, "Custom corpus.");
        assert_eq!(fs::read_to_string(&path).unwrap(), "Custom corpus.");
    }
}
