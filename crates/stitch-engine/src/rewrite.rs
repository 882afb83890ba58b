//! Instruction Rewriter: injects the probe prologue into matched methods.

use stitch_classfile::class::find_attribute;
use stitch_classfile::opcode::Instructions;
use stitch_classfile::writer::U2_MAX;
use stitch_classfile::{
    access, Attribute, ClassFile, ClassFileError, CodeAttribute, MethodDescriptor,
};
use stitch_config::ProbeKind;
use stitch_targets::JvmTarget;
use tracing::debug;

use crate::artifact::{
    InstrumentationPoint, RewriteResult, RewriteStatus, Rewritten, TransformTarget,
    MARKER_ATTRIBUTE,
};
use crate::error::RewriteError;
use crate::probe::{prologue, ProbeSpec};
use crate::relocate::{relocate, Shift};

/// Rewrites one class at a time. Holds no per-class state, so a single
/// rewriter is shared by every worker.
#[derive(Debug, Clone)]
pub struct Rewriter {
    probe: ProbeSpec,
    target: JvmTarget,
}

impl Rewriter {
    pub fn new(probe: ProbeSpec, target: JvmTarget) -> Self {
        Self { probe, target }
    }

    /// Rewrite `target`, consuming it.
    ///
    /// Classes with nothing to do come back byte for byte; failures are
    /// confined to the returned result.
    pub fn rewrite(&self, target: TransformTarget) -> RewriteResult {
        let TransformTarget {
            artifact,
            class,
            points,
            markers,
        } = target;

        let outcome = if points.is_empty() {
            Ok(Rewritten {
                bytes: artifact.bytes.clone(),
                status: RewriteStatus::Unchanged,
            })
        } else if markers > 0 || points.iter().all(|p| p.already_probed) {
            Ok(Rewritten {
                bytes: artifact.bytes.clone(),
                status: RewriteStatus::AlreadyInstrumented,
            })
        } else {
            self.instrument(class, &points)
        };

        if let Ok(rewritten) = &outcome {
            debug!(
                class = %artifact.name,
                status = rewritten.status.label(),
                "rewrote class"
            );
        }
        RewriteResult { artifact, outcome }
    }

    fn instrument(
        &self,
        mut class: ClassFile,
        points: &[InstrumentationPoint],
    ) -> Result<Rewritten, RewriteError> {
        if !self.target.accepts_major(class.major_version) {
            return Err(RewriteError::UnsupportedVersion {
                major: class.major_version,
                target: self.target,
            });
        }

        let pending: Vec<&InstrumentationPoint> =
            points.iter().filter(|p| !p.already_probed).collect();
        for point in &pending {
            self.check_point(point)?;
        }

        let probe_ref = class
            .constant_pool
            .add_methodref(&self.probe.owner, &self.probe.method, self.probe.descriptor())
            .map_err(|source| RewriteError::ConstantPool { source })?;

        let stack_maps_required = JvmTarget::from_major(class.major_version)
            .is_ok_and(JvmTarget::requires_stack_maps);
        for point in &pending {
            self.instrument_method(&mut class, point, probe_ref, stack_maps_required)?;
        }

        let marker = class
            .constant_pool
            .add_utf8(MARKER_ATTRIBUTE)
            .map_err(|source| RewriteError::ConstantPool { source })?;
        class.attributes.push(Attribute {
            name_index: marker,
            info: Vec::new(),
        });

        let bytes = class
            .to_bytes()
            .map_err(|source| RewriteError::Encode { source })?;
        Ok(Rewritten {
            bytes,
            status: RewriteStatus::Instrumented {
                methods: pending.len(),
            },
        })
    }

    fn check_point(&self, point: &InstrumentationPoint) -> Result<(), RewriteError> {
        if !point.has_code
            || access::has(point.access_flags, access::ACC_ABSTRACT)
            || access::has(point.access_flags, access::ACC_NATIVE)
        {
            return Err(RewriteError::NoCode {
                method: point.signature(),
                offset: point.entry_offset,
            });
        }
        if self.probe.kind == ProbeKind::Guard && point.name == "<init>" {
            return Err(RewriteError::Constructor {
                method: point.signature(),
                offset: point.entry_offset,
            });
        }
        Ok(())
    }

    fn instrument_method(
        &self,
        class: &mut ClassFile,
        point: &InstrumentationPoint,
        probe_ref: u16,
        stack_maps_required: bool,
    ) -> Result<(), RewriteError> {
        let method_name = point.signature();
        let ClassFile {
            constant_pool: pool,
            methods,
            ..
        } = class;
        let malformed = |offset: u32, source: ClassFileError| RewriteError::Malformed {
            method: method_name.clone(),
            offset,
            source,
        };

        let method = methods
            .get_mut(point.method_index)
            .ok_or_else(|| malformed(0, ClassFileError::MalformedAttribute {
                attribute: "Code",
                reason: format!("no method at index {}", point.method_index),
            }))?;
        let descriptor = MethodDescriptor::parse(&point.descriptor).map_err(|e| malformed(0, e))?;
        let slot = find_attribute(&method.attributes, pool, "Code").ok_or_else(|| {
            RewriteError::NoCode {
                method: method_name.clone(),
                offset: 0,
            }
        })?;
        let attribute = method
            .attributes
            .get_mut(slot)
            .ok_or_else(|| RewriteError::NoCode {
                method: method_name.clone(),
                offset: 0,
            })?;
        let mut code = CodeAttribute::parse(&attribute.info).map_err(|e| malformed(0, e))?;

        for instruction in Instructions::new(&code.code) {
            instruction.map_err(|e| malformed(error_offset(&e), e))?;
        }

        let inserted = prologue(self.probe.kind, probe_ref, descriptor.ret.as_ref());
        let new_len = code.code.len().saturating_add(usize::from(inserted.shift));
        if new_len > U2_MAX {
            return Err(RewriteError::Overflow {
                method: method_name.clone(),
                offset: u32::try_from(code.code.len()).unwrap_or(u32::MAX),
                what: "code length",
            });
        }

        relocate(
            &mut code,
            pool,
            Shift {
                amount: inserted.shift,
                landing: inserted.landing,
                stack_maps_required,
            },
            &method_name,
        )?;

        let mut body = inserted.code;
        body.extend_from_slice(&code.code);
        code.code = body;
        code.max_stack = code.max_stack.max(inserted.max_stack);
        attribute.info = code.to_info().map_err(|e| malformed(0, e))?;
        Ok(())
    }
}

fn error_offset(error: &ClassFileError) -> u32 {
    match error {
        ClassFileError::InvalidOpcode { offset, .. }
        | ClassFileError::TruncatedInstruction { offset } => {
            u32::try_from(*offset).unwrap_or(u32::MAX)
        }
        _ => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{self, ClassSpec, MethodSpec};
    use crate::scan::Scanner;
    use stitch_classfile::opcode::{IFEQ, INVOKESTATIC, NOP, RETURN};
    use stitch_classfile::StackMapTable;

    fn rewriter() -> Rewriter {
        Rewriter::new(fixtures::guard_probe(), JvmTarget::JAVA_8)
    }

    fn target_of(fixture: &ClassSpec) -> TransformTarget {
        let settings = fixtures::settings();
        Scanner::new(&settings)
            .target_from_bytes("Fixture.class", fixture.to_bytes())
            .unwrap()
    }

    fn code_of(bytes: &[u8], method: &str) -> CodeAttribute {
        let class = ClassFile::parse(bytes).unwrap();
        let m = class
            .methods
            .iter()
            .find(|m| m.name(&class.constant_pool).unwrap() == method)
            .unwrap();
        CodeAttribute::parse(&m.attribute(&class.constant_pool, "Code").unwrap().info).unwrap()
    }

    #[test]
    fn guard_prologue_is_injected() {
        let fixture = fixtures::listener("org/example/Button");
        let result = rewriter().rewrite(target_of(&fixture));
        let rewritten = result.outcome.unwrap();
        assert_eq!(
            rewritten.status,
            RewriteStatus::Instrumented { methods: 1 }
        );

        let class = ClassFile::parse(&rewritten.bytes).unwrap();
        assert_eq!(class.count_attributes(MARKER_ATTRIBUTE), 1);

        let code = code_of(&rewritten.bytes, "onClick");
        assert_eq!(code.code.first(), Some(&INVOKESTATIC));
        assert_eq!(code.code.get(3..7), Some(&[IFEQ, 0, 4, RETURN][..]));
        assert_eq!(code.code.get(7), Some(&NOP));
        assert_eq!(code.code.get(8..), Some(&fixtures::LISTENER_BODY[..]));
        assert!(code.max_stack >= 1);

        let probe_ref = u16::from_be_bytes([
            *code.code.get(1).unwrap(),
            *code.code.get(2).unwrap(),
        ]);
        let call = class.constant_pool.member_ref(probe_ref).unwrap();
        assert_eq!(call.owner, "org/example/FastClickUtil");
        assert_eq!(call.name, "isFastDoubleClick");
        assert_eq!(call.descriptor, "()Z");

        let frames = code
            .attributes
            .iter()
            .find(|a| a.name(&class.constant_pool).unwrap() == "StackMapTable")
            .map(|a| StackMapTable::parse(&a.info).unwrap())
            .unwrap();
        assert_eq!(frames.offsets(), vec![7]);
    }

    #[test]
    fn unmatched_class_is_returned_verbatim() {
        let fixture = ClassSpec::new("org/example/Plain").method(MethodSpec::void("onClick"));
        let target = target_of(&fixture);
        assert!(target.points.is_empty());
        let original = target.artifact.bytes.clone();
        let rewritten = rewriter().rewrite(target).outcome.unwrap();
        assert_eq!(rewritten.status, RewriteStatus::Unchanged);
        assert_eq!(rewritten.bytes, original);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let fixture = fixtures::listener("org/example/Button");
        let first = rewriter().rewrite(target_of(&fixture)).outcome.unwrap();

        let settings = fixtures::settings();
        let again = Scanner::new(&settings)
            .target_from_bytes("Button.class", first.bytes.clone())
            .unwrap();
        assert_eq!(again.markers, 1);
        let second = rewriter().rewrite(again).outcome.unwrap();
        assert_eq!(second.status, RewriteStatus::AlreadyInstrumented);
        assert_eq!(second.bytes, first.bytes);
    }

    #[test]
    fn abstract_method_fails_at_offset_zero() {
        let fixture = ClassSpec::new("org/example/Base")
            .implements(fixtures::LISTENER)
            .method(MethodSpec::abstract_method("onClick", fixtures::ON_CLICK));
        let result = rewriter().rewrite(target_of(&fixture));
        match result.outcome {
            Err(e @ RewriteError::NoCode { .. }) => assert_eq!(e.offset(), 0),
            other => panic!("expected NoCode, got {other:?}"),
        }
    }

    #[test]
    fn newer_class_version_is_rejected() {
        let fixture = fixtures::listener("org/example/Modern").major(61);
        match rewriter().rewrite(target_of(&fixture)).outcome {
            Err(RewriteError::UnsupportedVersion { major, .. }) => assert_eq!(major, 61),
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
        let lenient = Rewriter::new(fixtures::guard_probe(), "17".parse().unwrap());
        assert!(lenient.rewrite(target_of(&fixture)).outcome.is_ok());
    }

    #[test]
    fn malformed_code_reports_offset() {
        let fixture = ClassSpec::new("org/example/Broken")
            .implements(fixtures::LISTENER)
            .method(MethodSpec::with_code("onClick", fixtures::ON_CLICK, vec![NOP, NOP, 0xfe]));
        match rewriter().rewrite(target_of(&fixture)).outcome {
            Err(e @ RewriteError::Malformed { .. }) => assert_eq!(e.offset(), 2),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn guard_in_constructor_is_rejected() {
        let mut settings = fixtures::settings();
        settings.rules = vec![stitch_config::MatchRule {
            name: "<init>".to_owned(),
            descriptor: None,
            implements: None,
        }];
        let fixture = ClassSpec::new("org/example/Ctor")
            .method(MethodSpec::with_code("<init>", "()V", vec![RETURN]));
        let target = Scanner::new(&settings)
            .target_from_bytes("Ctor.class", fixture.to_bytes())
            .unwrap();
        assert!(matches!(
            rewriter().rewrite(target).outcome,
            Err(RewriteError::Constructor { offset: 0, .. })
        ));
    }

    #[test]
    fn enter_probe_keeps_return_type_and_frames() {
        let rewriter = Rewriter::new(fixtures::enter_probe(), JvmTarget::JAVA_8);
        let fixture = fixtures::listener("org/example/Button");
        let rewritten = rewriter.rewrite(target_of(&fixture)).outcome.unwrap();
        let code = code_of(&rewritten.bytes, "onClick");
        assert_eq!(code.code.len(), 4 + fixtures::LISTENER_BODY.len());
        assert_eq!(code.code.get(3), Some(&NOP));
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn value_returning_method_gets_default_return() {
        let mut settings = fixtures::settings();
        settings.rules = vec![stitch_config::MatchRule {
            name: "count".to_owned(),
            descriptor: Some("()J".to_owned()),
            implements: None,
        }];
        // lconst_1; lreturn
        let fixture = ClassSpec::new("org/example/Counter")
            .method(MethodSpec::with_code("count", "()J", vec![0x0a, 0xad]).max_stack(2));
        let target = Scanner::new(&settings)
            .target_from_bytes("Counter.class", fixture.to_bytes())
            .unwrap();
        let rewritten = rewriter().rewrite(target).outcome.unwrap();
        let code = code_of(&rewritten.bytes, "count");
        assert_eq!(code.code.len(), 12 + 2);
        assert_eq!(code.code.get(6..8), Some(&[0x09, 0xad][..]));
        assert_eq!(code.code.get(12..), Some(&[0x0a, 0xad][..]));
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn pre_java6_classes_get_no_stack_map() {
        let fixture = fixtures::listener("org/example/Old").major(49);
        let rewritten = rewriter().rewrite(target_of(&fixture)).outcome.unwrap();
        let class = ClassFile::parse(&rewritten.bytes).unwrap();
        let code = code_of(&rewritten.bytes, "onClick");
        assert!(code
            .attributes
            .iter()
            .all(|a| a.name(&class.constant_pool).unwrap() != "StackMapTable"));
    }

    #[test]
    fn java6_classes_get_a_stack_map() {
        let fixture = fixtures::listener("org/example/Six").major(50);
        let rewritten = rewriter().rewrite(target_of(&fixture)).outcome.unwrap();
        let class = ClassFile::parse(&rewritten.bytes).unwrap();
        let code = code_of(&rewritten.bytes, "onClick");
        assert!(code
            .attributes
            .iter()
            .any(|a| a.name(&class.constant_pool).unwrap() == "StackMapTable"));
    }
}
