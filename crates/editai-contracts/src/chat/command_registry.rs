#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
    CommandSpec {
        command: "topic",
        action: "use_topic",
    },
];

pub(crate) const SET_COMMAND: CommandSpec = CommandSpec {
    command: "set",
    action: "set_option",
};

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image",
        action: "attach_image",
    },
    CommandSpec {
        command: "mask",
        action: "attach_mask",
    },
    CommandSpec {
        command: "draw",
        action: "draw_mask",
    },
    CommandSpec {
        command: "save_mask",
        action: "save_mask",
    },
];

pub(crate) const ENTRY_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "regenerate",
        action: "regenerate",
    },
    CommandSpec {
        command: "expand",
        action: "expand",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "submit",
        action: "submit",
    },
    CommandSpec {
        command: "options",
        action: "show_options",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "close",
        action: "close_expanded",
    },
    CommandSpec {
        command: "topics",
        action: "topics",
    },
    CommandSpec {
        command: "models",
        action: "models",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode <generate|edit|variation>",
    "/model <name>",
    "/set <option> <value>",
    "/options",
    "/models",
    "/image <path>",
    "/mask <path>",
    "/draw <strokes.json>",
    "/save_mask <path>",
    "/submit",
    "/regenerate <entry>",
    "/expand <entry> [image]",
    "/close",
    "/download <entry> [image] [path]",
    "/history",
    "/topics",
    "/topic <n>",
    "/quit",
];

/// Starter prompts offered while the feed is empty.
pub const SUGGESTED_TOPICS: &[(&str, &str)] = &[
    (
        "Generate Image",
        "A futuristic city skyline at sunset with flying cars and neon lights",
    ),
    (
        "Edit Image",
        "Remove the red car from the street and replace it with a bicycle",
    ),
    (
        "Apply Filters",
        "Apply a vintage sepia filter to a portrait of a woman in a garden",
    ),
    (
        "Remove Background",
        "Isolate the person in the image and remove the background completely",
    ),
    (
        "Image Upscale",
        "Upscale a low-resolution image of a mountain landscape to 4K",
    ),
    (
        "Style Transfer",
        "Recreate a photo of a cat in the style of Van Gogh's Starry Night",
    ),
];
