use crate::register::Encoding;

/// The inverter reports to one decimal place; nothing finer is meaningful.
///
/// Rounds the exact binary value, ties to even, so `0.25` becomes `0.2` while
/// `0.35` (stored just below) becomes `0.3`.
pub fn round1(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Decode the value at `index` of a register reply.
///
/// Returns `None` when the reply is too short to hold the value.
pub fn decode(words: &[u16], index: usize, encoding: Encoding, scale: f64) -> Option<f64> {
    match encoding {
        Encoding::Int => words.get(index).map(|w| *w as f64),
        Encoding::Scaled16 => words.get(index).map(|w| round1(*w as f64 * scale)),
        Encoding::Scaled32 => decode_u32(words, index).map(|v| round1(v as f64 * scale)),
    }
}

/// Two consecutive words, high word first.
pub fn decode_u32(words: &[u16], index: usize) -> Option<u32> {
    let high = *words.get(index)? as u32;
    let low = *words.get(index + 1)? as u32;
    Some((high << 16) | low)
}

/// `count` words of packed ASCII, high byte first.
pub fn decode_ascii(words: &[u16], index: usize, count: usize) -> Option<String> {
    let words = words.get(index..index + count)?;
    Some(
        words
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .map(char::from)
            .collect(),
    )
}

const MODEL_FIELDS: [char; 6] = ['T', 'Q', 'P', 'U', 'M', 'S'];

/// Render the model register pair as `T<n> Q<n> P<n> U<n> M<n> S<n>`.
///
/// Each field is one nibble of the low 24 bits, most significant first.
pub fn decode_model(value: u32) -> String {
    MODEL_FIELDS
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let shift = 20 - 4 * i as u32;
            format!("{}{:X}", field, (value >> shift) & 0xF)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
