//! Command registry - the closed set of command types the agent understands

use std::fmt;
use std::str::FromStr;
use test_agent_shared::wire;

use super::DispatchError;

/// Command types accepted on the request topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// List the tests available per chip
    GetAllTests,
    /// Initiate a test
    RunTest,
    /// Stop a running test
    AbortTest,
    /// Status of a running test
    TestStatus,
    /// Run a particular test repeatedly
    RunLoopTest,
    /// Run a sequence of tests
    RunTestPlan,
}

impl CommandKind {
    /// Every registered command type
    pub const ALL: [CommandKind; 6] = [
        CommandKind::GetAllTests,
        CommandKind::RunTest,
        CommandKind::AbortTest,
        CommandKind::TestStatus,
        CommandKind::RunLoopTest,
        CommandKind::RunTestPlan,
    ];

    /// Look up a command type by its wire name
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "GetAllTests" => Some(CommandKind::GetAllTests),
            "RunTest" => Some(CommandKind::RunTest),
            "AbortTest" => Some(CommandKind::AbortTest),
            "TestStatus" => Some(CommandKind::TestStatus),
            "RunLoopTest" => Some(CommandKind::RunLoopTest),
            "RunTestPlan" => Some(CommandKind::RunTestPlan),
            _ => None,
        }
    }

    /// Wire name of this command type
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::GetAllTests => "GetAllTests",
            CommandKind::RunTest => "RunTest",
            CommandKind::AbortTest => "AbortTest",
            CommandKind::TestStatus => "TestStatus",
            CommandKind::RunLoopTest => "RunLoopTest",
            CommandKind::RunTestPlan => "RunTestPlan",
        }
    }

    /// Reply type name, e.g. `RunTestReply`
    pub fn reply_type(self) -> String {
        format!("{}{}", self.name(), wire::REPLY_TYPE_SUFFIX)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| DispatchError::UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_all_names() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::resolve(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        assert_eq!(CommandKind::resolve("runtest"), None);
        assert_eq!(CommandKind::resolve(""), None);
    }

    #[test]
    fn test_reply_type() {
        assert_eq!(CommandKind::RunTest.reply_type(), "RunTestReply");
        assert_eq!(CommandKind::AbortTest.reply_type(), "AbortTestReply");
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "Bogus".parse::<CommandKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown command type: Bogus");
    }
}
