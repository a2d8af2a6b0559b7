#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const ASPECT_COMMAND: CommandSpec = CommandSpec {
    command: "aspect",
    action: "set_aspect_ratio",
};

pub(crate) const ADJUST_COMMAND: CommandSpec = CommandSpec {
    command: "adjust",
    action: "adjust",
};

pub(crate) const SELECT_COMMAND: CommandSpec = CommandSpec {
    command: "select",
    action: "select_history",
};

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "save",
    action: "save_image",
}];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "attach",
    action: "attach_references",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "detach",
        action: "detach_references",
    },
    CommandSpec {
        command: "refine",
        action: "refine_with_ai",
    },
    CommandSpec {
        command: "remove_bg",
        action: "remove_background",
    },
    CommandSpec {
        command: "history",
        action: "show_history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_history",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

/// Ratios offered to the user; the backend receives the ratio verbatim.
pub const SUPPORTED_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4"];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/aspect",
    "/attach",
    "/detach",
    "/refine",
    "/adjust",
    "/remove_bg",
    "/history",
    "/select",
    "/clear",
    "/save",
    "/status",
    "/help",
];
