//! 调试模式下的对象路径记录。
//!
//! 每进入一次 `write_object`/`read_object` 压入一帧，离开时弹出；失败时把当前栈
//! 由内向外附加到错误上，便于定位嵌套结构中出错的字段。
//! 关闭调试时所有操作都是空操作，不产生任何分配。

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Process {
    Serialize,
    Deserialize,
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Serialize => f.write_str("SERIALIZE"),
            Process::Deserialize => f.write_str("DESERIALIZE"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SerializationDebugger {
    enabled: bool,
    frames: Vec<String>,
}

impl SerializationDebugger {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            frames: Vec::new(),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn push(&mut self, process: Process, field: &str, type_name: &str) {
        if self.enabled {
            self.frames
                .push(format!("[{process} => {field} (type={type_name})]"));
        }
    }

    pub(crate) fn pop(&mut self) {
        if self.enabled {
            self.frames.pop();
        }
    }

    /// 当前栈的副本，最内层在前。
    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.frames.iter().rev().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_reported_innermost_first() {
        let mut debugger = SerializationDebugger::new(true);
        debugger.push(Process::Serialize, "order", "demo::Order");
        debugger.push(Process::Serialize, "total", "i64");
        assert_eq!(
            debugger.snapshot(),
            [
                "[SERIALIZE => total (type=i64)]",
                "[SERIALIZE => order (type=demo::Order)]"
            ]
        );
        debugger.pop();
        assert_eq!(debugger.depth(), 1);
    }

    #[test]
    fn disabled_debugger_records_nothing() {
        let mut debugger = SerializationDebugger::new(false);
        debugger.push(Process::Deserialize, "value", "i32");
        assert_eq!(debugger.depth(), 0);
        assert!(debugger.snapshot().is_empty());
    }
}
