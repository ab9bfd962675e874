//! Conventions many OneBot implementations share but the protocol does not define.

/// Avatar URLs are only produced in compatibility mode. Face ids always map.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityUtil {
    enabled: bool,
}

impl CompatibilityUtil {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn group_avatar(&self, group_id: i64, size: u32) -> Option<String> {
        self.enabled
            .then(|| format!("https://p.qlogo.cn/gh/{group_id}/{group_id}/{size}"))
    }

    pub fn user_avatar(&self, user_id: i64, size: u32) -> Option<String> {
        self.enabled
            .then(|| format!("https://q2.qlogo.cn/headimg_dl?dst_uin={user_id}&spec={size}"))
    }
}

/// Emoji closest to a built-in face id.
pub fn face_emoji(id: i64) -> Option<&'static str> {
    let emoji = match id {
        0 => "😲",
        1 => "😖",
        2 => "😍",
        3 => "😶",
        4 => "😎",
        5 => "😭",
        6 => "😳",
        7 => "🤐",
        8 => "😴",
        9 => "😢",
        10 => "😟",
        11 => "😡",
        12 => "🤪",
        13 => "😁",
        14 => "😊",
        15 => "☹️",
        16 => "😎",
        18 => "😫",
        19 => "🤮",
        20 => "🤭",
        21 => "😊",
        22 => "🙄",
        23 => "😤",
        24 => "🥴",
        25 => "😪",
        26 => "😲",
        27 => "😓",
        28 => "😄",
        29 => "😙",
        30 => "✊",
        31 => "🤬",
        32 => "😕",
        33 => "🤫",
        34 => "😵‍💫",
        35 => "😣",
        36 => "🤯",
        37 => "💀",
        38 => "😡",
        39 => "👋",
        40 => "😑",
        96 => "😓",
        97 => "😅",
        98 => "😪",
        99 => "👏",
        100 => "😓",
        101 => "😁",
        102 => "😤",
        103 => "😤",
        104 => "🥱",
        105 => "😒",
        106 => "😟",
        107 => "😞",
        108 => "🥸",
        109 => "😙",
        110 => "😲",
        111 => "🥺",
        172 => "😜",
        173 => "😭",
        174 => "😛",
        175 => "😛",
        176 => "😊",
        177 => "🤢",
        178 => "😆",
        179 => "😊",
        180 => "😃",
        181 => "😐",
        182 => "😂",
        183 => "😝",
        212 => "😶",
        293 => "🐟",
        _ => return None,
    };
    Some(emoji)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatars_need_compatibility_mode() {
        let off = CompatibilityUtil::new(false);
        assert_eq!(off.group_avatar(42, 100), None);
        assert_eq!(off.user_avatar(7, 100), None);

        let on = CompatibilityUtil::new(true);
        assert_eq!(
            on.group_avatar(42, 100).as_deref(),
            Some("https://p.qlogo.cn/gh/42/42/100")
        );
        assert_eq!(
            on.user_avatar(7, 640).as_deref(),
            Some("https://q2.qlogo.cn/headimg_dl?dst_uin=7&spec=640")
        );
    }

    #[test]
    fn known_and_unknown_faces() {
        assert_eq!(face_emoji(14), Some("😊"));
        assert_eq!(face_emoji(293), Some("🐟"));
        assert_eq!(face_emoji(17), None);
        assert_eq!(face_emoji(-1), None);
    }
}
