//! Small local knowledge base used as grounding context when generating
//! remediation cards for a weak point.

const DEFAULT_CHUNKS: [&str; 5] = [
    "Confirmation Bias is the human tendency to search for, interpret, favor, and recall information in a way that confirms or supports one's prior beliefs or values. People display this bias when they gather or remember information selectively, or when they interpret it in a biased way. It affects individual and group decision-making and can lead to overconfidence and ignoring contrary evidence.",
    "The Availability Heuristic is a mental shortcut that relies on immediate examples that come to mind when evaluating a specific topic, concept, method, or decision. If something can be recalled easily it is judged to be important or frequent, so recent or vivid information is weighed too heavily. After seeing several news reports about car thefts, people overestimate how common vehicle theft is.",
    "The Dunning-Kruger Effect is a cognitive bias in which people with low ability at a task overestimate their ability. Without the self-awareness of metacognition, people cannot objectively evaluate their own competence. Conversely, highly competent individuals may underestimate their relative competence, assuming that tasks which are easy for them are also easy for others.",
    "Survivorship Bias is the logical error of concentrating on the people or things that survived some process and overlooking those that did not because of their lack of visibility. During World War II, Abraham Wald noted that analysts only studied the bombers that returned, so the holes they saw marked places where a plane could be hit and still fly home. He recommended armoring the areas that were unscathed.",
    "Anchoring Bias is a cognitive bias where an individual depends too heavily on an initial piece of information, the anchor, when making decisions. Later judgments are made by adjusting away from the anchor, and information is interpreted around it. The first price offered for a used car sets the standard for the rest of the negotiation.",
];

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    chunks: Vec<String>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNKS.iter().map(|c| c.to_string()).collect())
    }
}

impl KnowledgeBase {
    pub fn new(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    /// Returns the chunk containing the most query words longer than three
    /// characters. `None` when no chunk contains any of them.
    pub fn find_relevant_chunk(&self, query: &str) -> Option<&str> {
        let query = query.to_lowercase();
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.chars().count() > 3)
            .collect();

        let mut best: Option<(&str, usize)> = None;
        for chunk in &self.chunks {
            let lower = chunk.to_lowercase();
            let score = words.iter().filter(|w| lower.contains(*w)).count();
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((chunk, score));
            }
        }
        best.map(|(chunk, _)| chunk)
    }
}
