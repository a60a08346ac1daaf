/// 打包应用名称末尾常见的、与进程名无关的后缀（小写）。
const KNOWN_APP_SUFFIXES: [&str; 2] = ["win", "uwp"];

/// 打包应用的 AUMID 拆分结果：`<package>_<publisherId>!<entry>`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedAppId<'a> {
    /// 包名，例如 `AppleInc.AppleMusicWin`。
    pub package: &'a str,
    /// 发布者 ID，例如 `nzyj5cx40ttqa`。
    pub publisher_id: &'a str,
    /// 应用入口，例如 `App`。
    pub entry: &'a str,
}

impl<'a> PackagedAppId<'a> {
    /// 尝试将标识按打包应用的 AUMID 格式拆分。
    pub fn parse(id: &'a str) -> Option<Self> {
        let (family, entry) = id.split_once('!')?;
        let (package, publisher_id) = family.split_once('_')?;
        if package.is_empty() || publisher_id.is_empty() {
            return None;
        }
        Some(Self {
            package,
            publisher_id,
            entry,
        })
    }

    /// 包名最后一个 `.` 之后的部分，例如 `AppleMusicWin`。
    pub fn app_name(&self) -> &'a str {
        self.package.rsplit('.').next().unwrap_or(self.package)
    }

    /// 包名第一个 `.` 之前的发布者前缀，例如 `AppleInc`。包名不含 `.` 时为 `None`。
    pub fn publisher(&self) -> Option<&'a str> {
        self.package
            .split_once('.')
            .map(|(publisher, _)| publisher)
            .filter(|publisher| !publisher.is_empty())
    }
}

/// 去掉 `KNOWN_APP_SUFFIXES` 中的后缀（忽略大小写）。没有匹配的后缀时返回 `None`。
pub fn strip_known_suffix(name: &str) -> Option<&str> {
    let lower = name.to_ascii_lowercase();
    KNOWN_APP_SUFFIXES.iter().find_map(|suffix| {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            Some(&name[..name.len() - suffix.len()])
        } else {
            None
        }
    })
}

/// 路径最后一段的文件名，同时接受 `\` 和 `/` 分隔符。
pub fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// 去掉文件名的扩展名；没有扩展名时返回 `None`。
pub fn file_stem(file: &str) -> Option<&str> {
    file.rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
}

/// 从会话的应用身份中提取一个更易读的显示名称，只用于日志。
///
/// ## 解析逻辑
/// 1.  **对于可执行文件路径** (如 "C:\\Apps\\Spotify.exe"): 返回文件名 "Spotify.exe"。
/// 2.  **对于打包应用的 AUMID** (如 "`AppleInc.AppleMusicWin_nzyj5cx40ttqa!App`"):
///     a. 取包名的最后一段: "`AppleMusicWin`"
///     b. 在小写字母和大写字母之间插入空格: "`Apple Music Win`"
///     c. 移除常见的后缀并修剪空格: "`Apple Music`"
/// 3.  如果处理结果为空，则返回原始 ID。
pub fn display_name_from_app_id(id_str: &str) -> String {
    let Some(packaged) = PackagedAppId::parse(id_str) else {
        return file_name(id_str).to_string();
    };

    let app_name = packaged.app_name();
    let app_name = strip_known_suffix(app_name).unwrap_or(app_name);

    let mut pretty = String::with_capacity(app_name.len() + 5);
    let mut chars = app_name.chars().peekable();
    while let Some(current) = chars.next() {
        pretty.push(current);
        if let Some(&next) = chars.peek()
            && current.is_lowercase()
            && next.is_uppercase()
        {
            pretty.push(' ');
        }
    }

    let pretty = pretty.trim();
    if pretty.is_empty() {
        id_str.to_string()
    } else {
        pretty.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_packaged_app_id() {
        let id = PackagedAppId::parse("AppleInc.AppleMusicWin_nzyj5cx40ttqa!App").unwrap();
        assert_eq!(id.package, "AppleInc.AppleMusicWin");
        assert_eq!(id.publisher_id, "nzyj5cx40ttqa");
        assert_eq!(id.entry, "App");
        assert_eq!(id.app_name(), "AppleMusicWin");
        assert_eq!(id.publisher(), Some("AppleInc"));
    }

    #[test]
    fn plain_executables_are_not_packaged() {
        assert_eq!(PackagedAppId::parse("Spotify.exe"), None);
        assert_eq!(PackagedAppId::parse("C:\\Music\\foo_bar.exe"), None);
        assert_eq!(PackagedAppId::parse("_abc!App"), None);
    }

    #[test]
    fn strips_known_suffixes_case_insensitively() {
        assert_eq!(strip_known_suffix("AppleMusicWin"), Some("AppleMusic"));
        assert_eq!(strip_known_suffix("zunemusicuwp"), Some("zunemusic"));
        assert_eq!(strip_known_suffix("Spotify"), None);
        assert_eq!(strip_known_suffix("win"), None);
    }

    #[test]
    fn extracts_file_names() {
        assert_eq!(file_name("C:\\Program Files\\Foo\\Foo.exe"), "Foo.exe");
        assert_eq!(file_name("/usr/bin/mpv"), "mpv");
        assert_eq!(file_stem("Foo.exe"), Some("Foo"));
        assert_eq!(file_stem("mpv"), None);
    }

    #[test]
    fn display_names_are_prettified() {
        assert_eq!(
            display_name_from_app_id("AppleInc.AppleMusicWin_nzyj5cx40ttqa!App"),
            "Apple Music"
        );
        assert_eq!(
            display_name_from_app_id("SpotifyAB.SpotifyMusic_zpdnekdrzrea0!Spotify"),
            "Spotify Music"
        );
        assert_eq!(display_name_from_app_id("C:\\Apps\\cloudmusic.exe"), "cloudmusic.exe");
    }
}
