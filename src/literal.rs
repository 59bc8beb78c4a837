// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The literal text form of rhythms and melodies.
//!
//! ```text
//! rhythm = r(s(0, 0.5, 90), s(1, 0.25, 64));
//! melody = m(c(60, 64), c(67));
//! ```
//!
//! Strikes are `s(start, duration, velocity)` with times in beats. With a
//! scale, chords may instead be written as scale degrees, `n(0, 2)`.

use std::convert::TryFrom;

use snafu::{ensure, OptionExt, Snafu};

use crate::note::{Note, Velocity};
use crate::player::Transcription;
use crate::score::{Chord, Melody, Rhythm, Scale, Strike};
use crate::tempo::Tempo;

pub fn rhythm_to_code(rhythm: &Rhythm, tempo: &Tempo) -> String {
    let strikes: Vec<String> = rhythm
        .0
        .iter()
        .map(|s| {
            format!(
                "s({}, {}, {})",
                tempo.us_to_beats(s.start_us),
                tempo.us_to_beats(s.duration_us),
                s.velocity.to_midi()
            )
        })
        .collect();
    format!("r({})", strikes.join(", "))
}

/// Prints scale degrees if a scale is given and contains every note of the melody.
pub fn melody_to_code(melody: &Melody, scale: Option<&Scale>) -> String {
    let degrees = scale.and_then(|scale| {
        melody
            .0
            .iter()
            .map(|chord| {
                chord
                    .notes()
                    .map(|note| scale.degree_of(note))
                    .collect::<Option<Vec<_>>>()
            })
            .collect::<Option<Vec<_>>>()
    });

    let chords: Vec<String> = match degrees {
        Some(degrees) => degrees
            .iter()
            .map(|chord| format!("n({})", join(chord)))
            .collect(),
        None => melody
            .0
            .iter()
            .map(|chord| format!("c({})", join(&chord.notes().map(Note::to_midi).collect::<Vec<_>>())))
            .collect(),
    };
    format!("m({})", chords.join(", "))
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, PartialEq, Snafu)]
pub enum ParseError {
    #[snafu(display("Unexpected end of input, expected {}", expected))]
    UnexpectedEnd { expected: &'static str },
    #[snafu(display("Expected {} at offset {}, found {:?}", expected, offset, found))]
    Unexpected {
        expected: &'static str,
        found: char,
        offset: usize,
    },
    #[snafu(display("Invalid number {:?} at offset {}", text, offset))]
    InvalidNumber { text: String, offset: usize },
    #[snafu(display("Beat {} must not be negative", beats))]
    NegativeBeat { beats: f64 },
    #[snafu(display("Note {} is outside the MIDI range", value))]
    NoteOutOfRange { value: i64 },
    #[snafu(display("Velocity {} is outside the MIDI range", value))]
    VelocityOutOfRange { value: i64 },
    #[snafu(display("Scale degree {} requires a scale", degree))]
    NoScale { degree: i64 },
    #[snafu(display("Scale degree {} is outside the MIDI range", degree))]
    DegreeOutOfRange { degree: i64 },
    #[snafu(display("No line starting with \"{} =\"", name))]
    MissingLine { name: &'static str },
}

pub fn parse_rhythm(input: &str, tempo: &Tempo) -> Result<Rhythm, ParseError> {
    let mut parser = Parser::new(input);
    let rhythm = parser.parse_rhythm(tempo)?;
    parser.expect_eof()?;
    Ok(rhythm)
}

pub fn parse_melody(input: &str, scale: Option<&Scale>) -> Result<Melody, ParseError> {
    let mut parser = Parser::new(input);
    let melody = parser.parse_melody(scale)?;
    parser.expect_eof()?;
    Ok(melody)
}

/// Read back the text produced by `Transcription::to_code`.
pub fn parse_transcription(
    text: &str,
    tempo: &Tempo,
    scale: Option<&Scale>,
) -> Result<Transcription, ParseError> {
    let assignment = |name: &'static str| {
        text.lines()
            .filter_map(|line| {
                let rest = line.trim().strip_prefix(name)?;
                let value = rest.trim_start().strip_prefix('=')?;
                Some(value.trim().trim_end_matches(';'))
            })
            .next()
            .context(MissingLine { name })
    };
    Ok(Transcription {
        rhythm: parse_rhythm(assignment("rhythm")?, tempo)?,
        melody: parse_melody(assignment("melody")?, scale)?,
    })
}

struct Parser<'a> {
    stream: Scan<'a>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut stream = Scan::new(input);
        stream.skip_whitespace();
        Self { stream }
    }

    fn parse_rhythm(&mut self, tempo: &Tempo) -> Result<Rhythm, ParseError> {
        self.expect_call('r', "r(")?;
        let mut strikes = Vec::new();
        self.parse_list("strike", |p| {
            strikes.push(p.parse_strike(tempo)?);
            Ok(())
        })?;
        Ok(Rhythm(strikes))
    }

    fn parse_strike(&mut self, tempo: &Tempo) -> Result<Strike, ParseError> {
        self.expect_call('s', "s(")?;
        let start = self.parse_beat()?;
        self.expect(',', "','")?;
        let duration = self.parse_beat()?;
        self.expect(',', "','")?;
        let value = self.parse_integer()?;
        let velocity = Velocity::try_from_midi(value).context(VelocityOutOfRange { value })?;
        self.expect(')', "')'")?;
        Ok(Strike::new(
            tempo.beat_to_us(start),
            tempo.beat_to_us(duration),
            velocity,
        ))
    }

    fn parse_melody(&mut self, scale: Option<&Scale>) -> Result<Melody, ParseError> {
        self.expect_call('m', "m(")?;
        let mut chords = Vec::new();
        self.parse_list("chord", |p| {
            chords.push(p.parse_chord(scale)?);
            Ok(())
        })?;
        Ok(Melody(chords))
    }

    fn parse_chord(&mut self, scale: Option<&Scale>) -> Result<Chord, ParseError> {
        let kind = match self.stream.current() {
            Some((_, kind @ 'c')) | Some((_, kind @ 'n')) => kind,
            Some((offset, found)) => {
                return Unexpected {
                    expected: "c( or n(",
                    found,
                    offset,
                }
                .fail()
            }
            None => return UnexpectedEnd { expected: "chord" }.fail(),
        };
        self.expect_call(kind, "c( or n(")?;
        let mut values = Vec::new();
        self.parse_list("note", |p| {
            values.push(p.parse_integer()?);
            Ok(())
        })?;

        match kind {
            'c' => values
                .into_iter()
                .map(|value| Note::try_from_midi(value).context(NoteOutOfRange { value }))
                .collect(),
            _ => values
                .into_iter()
                .map(|degree| {
                    let scale = scale.context(NoScale { degree })?;
                    i32::try_from(degree)
                        .ok()
                        .and_then(|d| scale.get(d))
                        .context(DegreeOutOfRange { degree })
                })
                .collect(),
        }
    }

    /// Items separated by commas up to the closing parenthesis, which is consumed.
    fn parse_list(
        &mut self,
        expected: &'static str,
        mut item: impl FnMut(&mut Self) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        if self.peek_char(expected)? == ')' {
            return self.expect(')', "')'");
        }
        loop {
            item(self)?;
            match self.next_char("',' or ')'")? {
                (_, ',') => {}
                (_, ')') => break,
                (offset, found) => {
                    return Unexpected {
                        expected: "',' or ')'",
                        found,
                        offset,
                    }
                    .fail()
                }
            }
        }
        self.stream.skip_whitespace();
        Ok(())
    }

    /// A one letter function name followed by an opening parenthesis.
    fn expect_call(&mut self, name: char, expected: &'static str) -> Result<(), ParseError> {
        let (offset, found) = self.next_char(expected)?;
        ensure!(
            found == name,
            Unexpected {
                expected,
                found,
                offset
            }
        );
        self.expect('(', expected)
    }

    fn expect(&mut self, wanted: char, expected: &'static str) -> Result<(), ParseError> {
        let (offset, found) = self.next_char(expected)?;
        ensure!(
            found == wanted,
            Unexpected {
                expected,
                found,
                offset
            }
        );
        Ok(())
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        match self.stream.current() {
            None => Ok(()),
            Some((offset, found)) => Unexpected {
                expected: "end of input",
                found,
                offset,
            }
            .fail(),
        }
    }

    fn parse_beat(&mut self) -> Result<f64, ParseError> {
        let (offset, text) = self.number_text();
        let beats: f64 = text
            .parse()
            .ok()
            .context(InvalidNumber { text, offset })?;
        ensure!(beats >= 0.0, NegativeBeat { beats });
        Ok(beats)
    }

    fn parse_integer(&mut self) -> Result<i64, ParseError> {
        let (offset, text) = self.number_text();
        text.parse().ok().context(InvalidNumber { text, offset })
    }

    /// The characters of a number literal, possibly empty.
    fn number_text(&mut self) -> (usize, &'a str) {
        let start = self.stream.offset();
        while let Some((_, ch)) = self.stream.current() {
            if ch.is_ascii_digit() || ch == '.' || ch == '-' || ch == 'e' || ch == 'E' || ch == '+' {
                self.stream.advance();
            } else {
                break;
            }
        }
        let text = self.stream.slice_from(start);
        self.stream.skip_whitespace();
        (start, text)
    }

    /// The next non-whitespace character.
    fn next_char(&mut self, expected: &'static str) -> Result<(usize, char), ParseError> {
        let next = self.stream.next().context(UnexpectedEnd { expected })?;
        self.stream.skip_whitespace();
        Ok(next)
    }

    fn peek_char(&mut self, expected: &'static str) -> Result<char, ParseError> {
        self.stream
            .current()
            .map(|(_, ch)| ch)
            .context(UnexpectedEnd { expected })
    }
}

struct Scan<'a> {
    input: &'a str,
    stream: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Scan<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            stream: input.char_indices().peekable(),
        }
    }

    fn current(&mut self) -> Option<(usize, char)> {
        self.stream.peek().cloned()
    }

    fn next(&mut self) -> Option<(usize, char)> {
        self.stream.next()
    }

    fn advance(&mut self) {
        self.stream.next();
    }

    /// Byte offset of the current character, or the input length at the end.
    fn offset(&mut self) -> usize {
        self.current().map_or(self.input.len(), |(pos, _)| pos)
    }

    fn slice_from(&mut self, start: usize) -> &'a str {
        let end = self.offset();
        &self.input[start..end]
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, ch)) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }
}
