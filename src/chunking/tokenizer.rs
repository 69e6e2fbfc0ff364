/// Token-length estimation
///
/// Approximates a subword tokenizer: every run of alphanumeric characters
/// costs one token per four characters (rounded up) and every other
/// non-whitespace character costs one token. Whitespace is free, so joining
/// two spans with whitespace costs exactly the sum of their parts and
/// appending text never lowers the count.
pub fn count_tokens(text: &str) -> usize {
    let mut tokens = 0usize;
    let mut run = 0usize;

    for c in text.chars() {
        if c.is_alphanumeric() {
            run += 1;
            continue;
        }

        tokens += run.div_ceil(4);
        run = 0;

        if !c.is_whitespace() {
            tokens += 1;
        }
    }

    tokens + run.div_ceil(4)
}
