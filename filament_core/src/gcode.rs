//! Outbound G-code tap.
//!
//! Lines are only observed, never rewritten. The parser recognises the handful of
//! commands that matter for distance detection and ignores everything else.

use tracing::debug;

/// Commands relevant to the distance tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum GCode {
    /// `G0`-`G3`; every parsed `E` value in order.
    Move { extrusions: Vec<f64> },
    /// `G92`: position reset.
    SetPosition,
    /// `M82`
    AbsoluteExtrusion,
    /// `M83`
    RelativeExtrusion,
    Other,
}

/// Drop comments, a leading line number and a trailing checksum.
fn strip_framing(line: &str) -> &str {
    let body = line.split_once(';').map_or(line, |(code, _)| code);
    let body = body.rsplit_once('*').map_or(body, |(code, _)| code);
    body.trim()
}

fn is_line_number(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some('N' | 'n'))
        && !token[1..].is_empty()
        && token[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Split a command word such as `g01` into (`'G'`, 1).
fn command_word(token: &str) -> Option<(char, u32)> {
    let mut chars = token.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let number = chars.as_str().parse::<u32>().ok()?;
    Some((letter, number))
}

fn extrusions<'a>(line: &str, params: impl Iterator<Item = &'a str>) -> Vec<f64> {
    params
        .filter_map(|token| {
            let value = token.strip_prefix(['E', 'e'])?;
            match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    debug!(line, token, "ignoring malformed extrusion value");
                    None
                }
            }
        })
        .collect()
}

/// Classify one outbound line.
pub fn parse_line(line: &str) -> GCode {
    let body = strip_framing(line);
    let mut tokens = body.split_whitespace().peekable();
    if tokens.peek().is_some_and(|t| is_line_number(t)) {
        tokens.next();
    }
    let Some(word) = tokens.next().and_then(command_word) else {
        return GCode::Other;
    };

    match word {
        ('G', 0..=3) => GCode::Move {
            extrusions: extrusions(line, tokens),
        },
        ('G', 92) => GCode::SetPosition,
        ('M', 82) => GCode::AbsoluteExtrusion,
        ('M', 83) => GCode::RelativeExtrusion,
        _ => GCode::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("G1 X10 Y5 E3.5 F1200", vec![3.5])]
    #[case("G0 E-1.2", vec![-1.2])]
    #[case("G2 X1 Y1 I1 J0 E0.4", vec![0.4])]
    #[case("G3 E1 E2", vec![1.0, 2.0])]
    #[case("G1 X10 Y10", vec![])]
    #[case("G01 E2.5", vec![2.5])]
    #[case("g1 E2.5", vec![2.5])]
    #[case("g1 x4 e2.5", vec![2.5])]
    #[case("N42 G1 E7.25*91", vec![7.25])]
    #[case("G1 E4 ; retract compensation E99", vec![4.0])]
    fn parses_moves(#[case] line: &str, #[case] expected: Vec<f64>) {
        assert_eq!(parse_line(line), GCode::Move { extrusions: expected });
    }

    #[rstest]
    #[case("G1 Eabc", vec![])]
    #[case("G1 E", vec![])]
    #[case("G1 Enan E2", vec![2.0])]
    #[case("G1 E1.0.0 X3 E5", vec![5.0])]
    fn malformed_extrusions_are_skipped(#[case] line: &str, #[case] expected: Vec<f64>) {
        assert_eq!(parse_line(line), GCode::Move { extrusions: expected });
    }

    #[rstest]
    #[case("G92 E0", GCode::SetPosition)]
    #[case("G92", GCode::SetPosition)]
    #[case("M82", GCode::AbsoluteExtrusion)]
    #[case("M83", GCode::RelativeExtrusion)]
    #[case("M104 S200", GCode::Other)]
    #[case("G28", GCode::Other)]
    #[case("G10", GCode::Other)]
    #[case("", GCode::Other)]
    #[case("; only a comment", GCode::Other)]
    #[case("T0", GCode::Other)]
    #[case("N7", GCode::Other)]
    fn classifies_other_commands(#[case] line: &str, #[case] expected: GCode) {
        assert_eq!(parse_line(line), expected);
    }
}
