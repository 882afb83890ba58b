//! Class files built in memory for tests.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use stitch_classfile::access::{ACC_ABSTRACT, ACC_PUBLIC, ACC_SUPER};
use stitch_classfile::opcode::RETURN;
use stitch_classfile::{Attribute, ClassFile, CodeAttribute, ConstantPool, MemberInfo, MethodDescriptor};
use stitch_config::{MatchRule, ProbeKind};
use stitch_targets::JvmTarget;
use stitch_util::pattern::PatternSet;

use crate::probe::ProbeSpec;
use crate::settings::Settings;

pub(crate) const LISTENER: &str = "android/view/View$OnClickListener";
pub(crate) const ON_CLICK: &str = "(Landroid/view/View;)V";
/// `aload_1; pop; return`
pub(crate) const LISTENER_BODY: [u8; 3] = [0x2b, 0x57, RETURN];

#[derive(Debug, Clone)]
pub(crate) struct MethodSpec {
    name: String,
    descriptor: String,
    access: u16,
    code: Option<Vec<u8>>,
    max_stack: u16,
}

impl MethodSpec {
    pub(crate) fn void(name: &str) -> Self {
        Self::with_code(name, "()V", vec![RETURN])
    }

    pub(crate) fn with_code(name: &str, descriptor: &str, code: Vec<u8>) -> Self {
        Self {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access: ACC_PUBLIC,
            code: Some(code),
            max_stack: 1,
        }
    }

    pub(crate) fn abstract_method(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access: ACC_PUBLIC | ACC_ABSTRACT,
            code: None,
            max_stack: 0,
        }
    }

    pub(crate) fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClassSpec {
    name: String,
    major: u16,
    interfaces: Vec<String>,
    methods: Vec<MethodSpec>,
}

impl ClassSpec {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            major: 52,
            interfaces: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub(crate) fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_owned());
        self
    }

    pub(crate) fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub(crate) fn major(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub(crate) fn to_class(&self) -> ClassFile {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(&self.name).unwrap();
        let super_class = pool.add_class("java/lang/Object").unwrap();
        let interfaces = self
            .interfaces
            .iter()
            .map(|i| pool.add_class(i).unwrap())
            .collect();
        let code_name = pool.add_utf8("Code").unwrap();
        let methods = self
            .methods
            .iter()
            .map(|m| {
                let params = MethodDescriptor::parse(&m.descriptor).unwrap().param_slots();
                let attributes = m
                    .code
                    .as_ref()
                    .map(|code| Attribute {
                        name_index: code_name,
                        info: CodeAttribute {
                            max_stack: m.max_stack,
                            max_locals: params + 1,
                            code: code.clone(),
                            exception_table: Vec::new(),
                            attributes: Vec::new(),
                        }
                        .to_info()
                        .unwrap(),
                    })
                    .into_iter()
                    .collect();
                MemberInfo {
                    access_flags: m.access,
                    name_index: pool.add_utf8(&m.name).unwrap(),
                    descriptor_index: pool.add_utf8(&m.descriptor).unwrap(),
                    attributes,
                }
            })
            .collect();
        ClassFile {
            minor_version: 0,
            major_version: self.major,
            constant_pool: pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces,
            fields: Vec::new(),
            methods,
            attributes: Vec::new(),
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.to_class().to_bytes().unwrap()
    }
}

/// A click listener whose `onClick` matches the default rule.
pub(crate) fn listener(name: &str) -> ClassSpec {
    ClassSpec::new(name).implements(LISTENER).method(MethodSpec::with_code(
        "onClick",
        ON_CLICK,
        LISTENER_BODY.to_vec(),
    ))
}

pub(crate) fn guard_probe() -> ProbeSpec {
    ProbeSpec {
        owner: "org/example/FastClickUtil".to_owned(),
        method: "isFastDoubleClick".to_owned(),
        kind: ProbeKind::Guard,
    }
}

pub(crate) fn enter_probe() -> ProbeSpec {
    ProbeSpec {
        owner: "org/example/Trace".to_owned(),
        method: "enter".to_owned(),
        kind: ProbeKind::Enter,
    }
}

/// Settings rooted at `classes/` and `out/`, matching `onClick` in listeners.
pub(crate) fn settings() -> Settings {
    Settings {
        root: PathBuf::from("classes"),
        output: PathBuf::from("out"),
        patterns: PatternSet::new(&["**/*.class".to_owned()], &[]).unwrap(),
        rules: vec![MatchRule {
            name: "onClick".to_owned(),
            descriptor: Some(ON_CLICK.to_owned()),
            implements: Some(LISTENER.to_owned()),
        }],
        probe: guard_probe(),
        target: JvmTarget::JAVA_8,
        jobs: Some(2),
        timeout: None,
    }
}

/// Like [`settings`], with both directories under `dir`; the scan root exists.
pub(crate) fn settings_at(dir: &Path) -> Settings {
    let root = dir.join("classes");
    std::fs::create_dir_all(&root).unwrap();
    Settings {
        root,
        output: dir.join("out"),
        ..settings()
    }
}

/// Write `fixture` under `root` at its package path and return the file path.
pub(crate) fn write_class(root: &Path, fixture: &ClassSpec) -> PathBuf {
    let path = root.join(format!("{}.class", fixture.name));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, fixture.to_bytes()).unwrap();
    path
}
