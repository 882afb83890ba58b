//! Moving a method body forward to make room for a prologue.
//!
//! Branches inside the body are relative and stay valid. Everything that
//! names an absolute code offset is rewritten here.

use stitch_classfile::code::{
    parse_line_numbers, parse_local_variables, write_line_numbers, write_local_variables,
};
use stitch_classfile::{
    Attribute, ClassFileError, CodeAttribute, ConstantPool, StackMapFrame, StackMapTable,
    VerificationType,
};

use crate::error::RewriteError;

const STACK_MAP_TABLE: &str = "StackMapTable";

/// How a body is being moved.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shift {
    /// Bytes inserted before offset 0.
    pub amount: u16,
    /// Offset inside the prologue that needs its own stack map frame.
    pub landing: Option<u16>,
    /// Whether a `StackMapTable` must exist after rewriting.
    pub stack_maps_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    LineNumbers,
    LocalVariables,
    StackMap,
    TypeAnnotations,
    Other,
}

fn classify(name: &str) -> Table {
    match name {
        "LineNumberTable" => Table::LineNumbers,
        "LocalVariableTable" | "LocalVariableTypeTable" => Table::LocalVariables,
        STACK_MAP_TABLE => Table::StackMap,
        "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
            Table::TypeAnnotations
        }
        _ => Table::Other,
    }
}

/// Relocate the exception table and nested attributes of `code` by `shift`.
///
/// The code array itself is left alone; the caller prepends the prologue.
/// Type annotations are dropped since their offsets are not decoded.
///
/// # Errors
/// Returns an error if a shifted offset no longer fits in 16 bits or a
/// nested table is malformed.
pub(crate) fn relocate(
    code: &mut CodeAttribute,
    pool: &mut ConstantPool,
    shift: Shift,
    method: &str,
) -> Result<(), RewriteError> {
    let by = shift.amount;
    for entry in &mut code.exception_table {
        entry.start_pc = moved(entry.start_pc, by, method, "exception range start")?;
        entry.end_pc = moved(entry.end_pc, by, method, "exception range end")?;
        entry.handler_pc = moved(entry.handler_pc, by, method, "exception handler")?;
    }

    let mut attributes = Vec::with_capacity(code.attributes.len().saturating_add(1));
    let mut saw_stack_map = false;
    for attribute in std::mem::take(&mut code.attributes) {
        let table = attribute.name(pool).map_or(Table::Other, classify);
        let info = match table {
            Table::Other => attribute.info,
            Table::TypeAnnotations => continue,
            Table::LineNumbers => {
                let mut rows = parse_line_numbers(&attribute.info).map_err(|e| malformed(method, e))?;
                for row in &mut rows {
                    row.start_pc = moved(row.start_pc, by, method, "line number entry")?;
                }
                write_line_numbers(&rows).map_err(|e| malformed(method, e))?
            }
            Table::LocalVariables => {
                let mut rows =
                    parse_local_variables(&attribute.info).map_err(|e| malformed(method, e))?;
                for row in &mut rows {
                    // Variables live from entry keep covering the prologue.
                    if row.start_pc == 0 {
                        row.length = moved(row.length, by, method, "local variable range")?;
                    } else {
                        row.start_pc = moved(row.start_pc, by, method, "local variable range")?;
                    }
                }
                write_local_variables(&rows).map_err(|e| malformed(method, e))?
            }
            Table::StackMap => {
                saw_stack_map = true;
                let mut table =
                    StackMapTable::parse(&attribute.info).map_err(|e| malformed(method, e))?;
                shift_frames(&mut table, shift, method)?;
                table.to_info().map_err(|e| malformed(method, e))?
            }
        };
        attributes.push(Attribute {
            name_index: attribute.name_index,
            info,
        });
    }

    if !saw_stack_map && shift.stack_maps_required {
        if let Some(landing) = shift.landing {
            let name_index = pool
                .add_utf8(STACK_MAP_TABLE)
                .map_err(|source| RewriteError::ConstantPool { source })?;
            let table = StackMapTable {
                frames: vec![StackMapFrame::Same {
                    offset_delta: landing,
                }],
            };
            attributes.push(Attribute {
                name_index,
                info: table.to_info().map_err(|e| malformed(method, e))?,
            });
        }
    }

    code.attributes = attributes;
    Ok(())
}

/// Shift every frame by `shift.amount`, inserting a frame at the landing pad.
fn shift_frames(table: &mut StackMapTable, shift: Shift, method: &str) -> Result<(), RewriteError> {
    let by = shift.amount;
    for frame in &mut table.frames {
        for ty in frame.types_mut() {
            if let VerificationType::Uninitialized(offset) = ty {
                *offset = moved(*offset, by, method, "uninitialized value")?;
            }
        }
    }

    // Only the first delta is absolute; later ones are relative to it.
    if let Some(first) = table.frames.first_mut() {
        let old = first.offset_delta();
        let delta = match shift.landing {
            // new_abs - landing - 1, where new_abs = old + by > landing
            Some(landing) => old
                .checked_add(by)
                .and_then(|abs| abs.checked_sub(landing))
                .and_then(|d| d.checked_sub(1)),
            None => old.checked_add(by),
        };
        let delta = delta.ok_or(RewriteError::Overflow {
            method: method.to_owned(),
            offset: u32::from(old),
            what: "stack map frame",
        })?;
        first.set_offset_delta(delta);
    }

    if let Some(landing) = shift.landing {
        table.frames.insert(
            0,
            StackMapFrame::Same {
                offset_delta: landing,
            },
        );
    }
    Ok(())
}

fn moved(pc: u16, by: u16, method: &str, what: &'static str) -> Result<u16, RewriteError> {
    pc.checked_add(by).ok_or(RewriteError::Overflow {
        method: method.to_owned(),
        offset: u32::from(pc),
        what,
    })
}

fn malformed(method: &str, source: ClassFileError) -> RewriteError {
    RewriteError::Malformed {
        method: method.to_owned(),
        offset: 0,
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stitch_classfile::code::{LineNumber, LocalVariable};
    use stitch_classfile::ExceptionEntry;

    const GUARD: Shift = Shift {
        amount: 8,
        landing: Some(7),
        stack_maps_required: true,
    };
    const ENTER: Shift = Shift {
        amount: 4,
        landing: None,
        stack_maps_required: true,
    };

    fn attribute(pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> Attribute {
        Attribute {
            name_index: pool.add_utf8(name).unwrap(),
            info,
        }
    }

    fn info_of<'a>(code: &'a CodeAttribute, pool: &ConstantPool, name: &str) -> Option<&'a [u8]> {
        code.attributes
            .iter()
            .find(|a| a.name(pool).is_ok_and(|n| n == name))
            .map(|a| a.info.as_slice())
    }

    fn code_with(attributes: Vec<Attribute>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 1,
            max_locals: 2,
            code: vec![0; 20],
            exception_table: vec![ExceptionEntry {
                start_pc: 0,
                end_pc: 10,
                handler_pc: 12,
                catch_type: 0,
            }],
            attributes,
        }
    }

    #[test]
    fn shifts_exception_table_and_line_numbers() {
        let mut pool = ConstantPool::new();
        let lines = write_line_numbers(&[
            LineNumber {
                start_pc: 0,
                line_number: 3,
            },
            LineNumber {
                start_pc: 12,
                line_number: 5,
            },
        ])
        .unwrap();
        let lines = attribute(&mut pool, "LineNumberTable", lines);
        let mut code = code_with(vec![lines]);
        relocate(&mut code, &mut pool, ENTER, "run()V").unwrap();

        assert_eq!(
            code.exception_table,
            vec![ExceptionEntry {
                start_pc: 4,
                end_pc: 14,
                handler_pc: 16,
                catch_type: 0,
            }]
        );
        let rows = parse_line_numbers(info_of(&code, &pool, "LineNumberTable").unwrap()).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.start_pc).collect::<Vec<_>>(),
            vec![4, 16]
        );
    }

    #[test]
    fn locals_live_from_entry_are_widened() {
        let mut pool = ConstantPool::new();
        let rows = vec![
            LocalVariable {
                start_pc: 0,
                length: 20,
                name_index: 1,
                descriptor_index: 2,
                index: 0,
            },
            LocalVariable {
                start_pc: 6,
                length: 10,
                name_index: 1,
                descriptor_index: 2,
                index: 1,
            },
        ];
        let table = attribute(
            &mut pool,
            "LocalVariableTable",
            write_local_variables(&rows).unwrap(),
        );
        let mut code = code_with(vec![table]);
        relocate(&mut code, &mut pool, GUARD, "onClick").unwrap();

        let rows =
            parse_local_variables(info_of(&code, &pool, "LocalVariableTable").unwrap()).unwrap();
        let first = rows.first().unwrap();
        assert_eq!((first.start_pc, first.length), (0, 28));
        let second = rows.get(1).unwrap();
        assert_eq!((second.start_pc, second.length), (14, 10));
    }

    #[test]
    fn guard_inserts_landing_frame() {
        let mut pool = ConstantPool::new();
        let original = StackMapTable {
            frames: vec![
                StackMapFrame::Same { offset_delta: 5 },
                StackMapFrame::SameLocals1StackItem {
                    offset_delta: 3,
                    stack: VerificationType::Uninitialized(2),
                },
            ],
        };
        let table = attribute(&mut pool, "StackMapTable", original.to_info().unwrap());
        let mut code = code_with(vec![table]);
        relocate(&mut code, &mut pool, GUARD, "onClick").unwrap();

        let table = StackMapTable::parse(info_of(&code, &pool, "StackMapTable").unwrap()).unwrap();
        // Frames at 7 (landing), 13 (was 5), 17 (was 9).
        assert_eq!(table.offsets(), vec![7, 13, 17]);
        assert_eq!(
            table.frames.get(2),
            Some(&StackMapFrame::SameLocals1StackItem {
                offset_delta: 3,
                stack: VerificationType::Uninitialized(10),
            })
        );
    }

    #[test]
    fn guard_handles_frame_at_entry() {
        let mut pool = ConstantPool::new();
        let original = StackMapTable {
            frames: vec![StackMapFrame::Same { offset_delta: 0 }],
        };
        let table = attribute(&mut pool, "StackMapTable", original.to_info().unwrap());
        let mut code = code_with(vec![table]);
        relocate(&mut code, &mut pool, GUARD, "loop").unwrap();
        let table = StackMapTable::parse(info_of(&code, &pool, "StackMapTable").unwrap()).unwrap();
        assert_eq!(table.offsets(), vec![7, 8]);
    }

    #[test]
    fn enter_shifts_first_frame_only() {
        let mut pool = ConstantPool::new();
        let original = StackMapTable {
            frames: vec![
                StackMapFrame::Same { offset_delta: 5 },
                StackMapFrame::Same { offset_delta: 1 },
            ],
        };
        let table = attribute(&mut pool, "StackMapTable", original.to_info().unwrap());
        let mut code = code_with(vec![table]);
        relocate(&mut code, &mut pool, ENTER, "run").unwrap();
        let table = StackMapTable::parse(info_of(&code, &pool, "StackMapTable").unwrap()).unwrap();
        assert_eq!(table.offsets(), vec![9, 11]);
    }

    #[test]
    fn creates_stack_map_when_required() {
        let mut pool = ConstantPool::new();
        let mut code = code_with(Vec::new());
        relocate(&mut code, &mut pool, GUARD, "onClick").unwrap();
        let table = StackMapTable::parse(info_of(&code, &pool, "StackMapTable").unwrap()).unwrap();
        assert_eq!(table.offsets(), vec![7]);

        let mut legacy = code_with(Vec::new());
        let shift = Shift {
            stack_maps_required: false,
            ..GUARD
        };
        relocate(&mut legacy, &mut pool, shift, "onClick").unwrap();
        assert!(legacy.attributes.is_empty());
    }

    #[test]
    fn drops_type_annotations_and_keeps_unknown() {
        let mut pool = ConstantPool::new();
        let annotations = attribute(&mut pool, "RuntimeVisibleTypeAnnotations", vec![0, 0]);
        let custom = attribute(&mut pool, "Custom", vec![1, 2, 3]);
        let mut code = code_with(vec![annotations, custom.clone()]);
        relocate(&mut code, &mut pool, ENTER, "run").unwrap();
        assert_eq!(code.attributes, vec![custom]);
    }

    #[test]
    fn overflowing_offset_is_reported() {
        let mut pool = ConstantPool::new();
        let mut code = code_with(Vec::new());
        if let Some(entry) = code.exception_table.first_mut() {
            entry.handler_pc = 65_533;
        }
        match relocate(&mut code, &mut pool, GUARD, "big") {
            Err(RewriteError::Overflow { offset, what, .. }) => {
                assert_eq!(offset, 65_533);
                assert_eq!(what, "exception handler");
            }
            other => panic!("expected Overflow, got {other:?}"),
        }
    }

    proptest::proptest! {
        #[test]
        fn frame_offsets_move_by_the_prologue(deltas in proptest::collection::vec(0u16..200, 1..12)) {
            let mut pool = ConstantPool::new();
            let original = StackMapTable {
                frames: deltas
                    .iter()
                    .map(|&offset_delta| StackMapFrame::Same { offset_delta })
                    .collect(),
            };
            let before = original.offsets();
            let table = attribute(&mut pool, "StackMapTable", original.to_info().unwrap());
            let mut code = code_with(vec![table]);
            relocate(&mut code, &mut pool, GUARD, "m").unwrap();

            let table = StackMapTable::parse(info_of(&code, &pool, "StackMapTable").unwrap()).unwrap();
            let mut expected = vec![7];
            expected.extend(before.iter().map(|o| o + 8));
            proptest::prop_assert_eq!(table.offsets(), expected);
        }
    }
}
